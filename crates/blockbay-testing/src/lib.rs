//! Testing utilities for blockbay
//!
//! This crate provides:
//! - A host runtime that records every call made into it
//! - Fixture extensions, devices and module loaders
//! - Spawners for driving isolated contexts by hand

pub mod fixtures;
pub mod host;

pub use fixtures::{
    fixture_builtins, FixtureBoard, FixtureLoader, Greeter, HeldSpawner, FIXTURE_DEVICE,
    FIXTURE_EXTENSION, OTHER_DEVICE,
};
pub use host::{HostCall, RecordingHost};
