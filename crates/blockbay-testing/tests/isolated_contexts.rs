//! Extensions loaded by URL into isolated contexts.

use std::sync::Arc;

use blockbay_core::prelude::*;
use blockbay_core::worker::{run_context, ContextState};
use blockbay_core::TaskSpawner;
use blockbay_testing::{fixture_builtins, FixtureLoader, HeldSpawner, HostCall, RecordingHost};
use serde_json::{json, Value};

fn isolated_manager(
    host: &Arc<RecordingHost>,
    loader: &Arc<FixtureLoader>,
) -> Arc<ExtensionManager> {
    ExtensionManager::builder(host.clone())
        .with_builtins(fixture_builtins())
        .with_spawner(Arc::new(TaskSpawner::new(loader.clone())))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_remote_extension_round_trip() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    manager
        .load_extension_url("fixture://greeter/remote")
        .await
        .unwrap();
    assert!(manager.is_extension_loaded("remote"));

    let service = manager.registry().extension_service("remote").unwrap();
    assert_eq!(service, "extension_0_remote");
    assert!(manager.dispatcher().is_remote_service(&service).unwrap());

    let greeting = manager
        .dispatcher()
        .call(&service, "greet", vec![json!({"NAME": "Bob"})])
        .await
        .unwrap();
    assert_eq!(greeting, json!("Hello, Bob"));

    let err = manager
        .dispatcher()
        .call(&service, "fail", vec![json!({})])
        .await
        .unwrap_err();
    match err {
        Error::Remote(payload) => assert!(payload.message.contains("greeter refused")),
        other => panic!("unexpected error: {other:?}"),
    }

    // Unknown methods are answered with nothing.
    let nothing = manager
        .dispatcher()
        .call(&service, "notImplemented", vec![json!({})])
        .await
        .unwrap();
    assert_eq!(nothing, Value::Null);
}

#[tokio::test]
async fn test_remote_descriptor_refuses_sync_calls() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);
    manager
        .load_extension_url("fixture://greeter/remote")
        .await
        .unwrap();

    let descriptor = host.extension("remote").unwrap();
    let greet = descriptor.block("greet").and_then(|b| b.func.clone()).unwrap();
    assert!(matches!(
        greet.call_sync(json!({"NAME": "Cy"})),
        Err(Error::SyncOnRemote(_))
    ));
    assert_eq!(greet.call(json!({"NAME": "Cy"})).await.unwrap(), json!("Hello, Cy"));

    let names = descriptor.menu("names").and_then(|m| m.dynamic()).unwrap();
    assert!(matches!(names.open(), Err(Error::SyncOnRemote(_))));
}

#[tokio::test]
async fn test_failed_module_load_rejects() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    let err = manager.load_extension_url("fixture://fail").await.unwrap_err();
    match err {
        Error::Remote(payload) => assert!(payload.message.contains("fixture failed to load")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.worker_state(0), Some(ContextState::Failed));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_same_id_from_two_contexts_registers_once() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    manager.load_extension_url("fixture://greeter/dup").await.unwrap();
    manager.load_extension_url("fixture://greeter/dup").await.unwrap();

    let registrations = host
        .calls()
        .into_iter()
        .filter(|call| matches!(call, HostCall::RegisterExtension { id, .. } if id == "dup"))
        .count();
    assert_eq!(registrations, 1);
    assert_eq!(host.registered_extension_count(), 1);
    assert_eq!(loader.loaded().len(), 2);
}

#[tokio::test]
async fn test_invalid_remote_id_fails_the_load() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    let err = manager
        .load_extension_url("fixture://greeter/bad-id")
        .await
        .unwrap_err();
    match err {
        Error::Remote(payload) => assert!(payload.message.contains("Invalid descriptor")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(manager.worker_state(0), Some(ContextState::Failed));
    assert!(!manager.is_extension_loaded("bad-id"));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_remote_registration_can_be_retried() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    host.reject_registrations(true);
    let err = manager
        .load_extension_url("fixture://greeter/remote")
        .await
        .unwrap_err();
    match err {
        Error::Remote(payload) => assert!(payload.message.contains("registration rejected")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!manager.is_extension_loaded("remote"));
    assert_eq!(host.registered_extension_count(), 0);

    host.reject_registrations(false);
    manager
        .load_extension_url("fixture://greeter/remote")
        .await
        .unwrap();
    assert!(manager.is_extension_loaded("remote"));
    assert_eq!(host.registered_extension_count(), 1);
    assert_eq!(
        manager.registry().extension_service("remote").as_deref(),
        Some("extension_1_remote")
    );
}

#[tokio::test]
async fn test_contexts_claim_loads_oldest_first() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let spawner = Arc::new(HeldSpawner::new());
    let manager = ExtensionManager::builder(host.clone())
        .with_spawner(spawner.clone())
        .build()
        .unwrap();

    let mut loads = Vec::new();
    for (n, id) in ["a", "b", "c"].into_iter().enumerate() {
        let manager = manager.clone();
        let url = format!("fixture://greeter/{id}");
        loads.push(tokio::spawn(async move { manager.load_extension_url(&url).await }));
        while spawner.held() < n + 1 {
            tokio::task::yield_now().await;
        }
    }
    assert_eq!(manager.pending_load_count(), 3);

    // Start the newest context first; it still gets the oldest load.
    let mut contexts = spawner.take();
    contexts.reverse();
    for (end, load) in contexts.into_iter().zip(loads) {
        tokio::spawn(run_context(end, loader.clone()));
        load.await.unwrap().unwrap();
    }

    assert_eq!(
        loader.loaded(),
        vec![
            "fixture://greeter/a".to_string(),
            "fixture://greeter/b".to_string(),
            "fixture://greeter/c".to_string(),
        ]
    );
    assert_eq!(manager.pending_load_count(), 0);
    assert_eq!(manager.pending_worker_count(), 0);
    for id in ["a", "b", "c"] {
        assert!(manager.is_extension_loaded(id));
    }
}

#[tokio::test]
async fn test_init_report_from_unknown_worker_is_ignored() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    manager.on_worker_init(999, None);
    assert_eq!(manager.worker_state(999), None);
    assert_eq!(manager.pending_worker_count(), 0);
}

#[tokio::test]
async fn test_teardown_forgets_everything() {
    let host = Arc::new(RecordingHost::new());
    let loader = Arc::new(FixtureLoader::new());
    let manager = isolated_manager(&host, &loader);

    manager
        .load_extension_url("fixture://greeter/remote")
        .await
        .unwrap();
    manager.load_extension_id_sync("greeter").unwrap();
    manager.load_device(DeviceRequest::new("boardB")).unwrap();
    let service = manager.registry().extension_service("remote").unwrap();

    manager.teardown();

    assert!(!manager.is_extension_loaded("remote"));
    assert!(!manager.is_extension_loaded("greeter"));
    assert_eq!(manager.device_state(), DeviceState::None);
    assert!(manager.dispatcher().service_names().is_empty());
    assert!(matches!(
        manager.dispatcher().call(&service, "greet", Vec::new()).await,
        Err(Error::ServiceNotFound(_))
    ));
}
