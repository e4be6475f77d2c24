//! Message channel between the host and an isolated context.
//!
//! Every exchange with a context is one of the messages below. Calls are
//! correlated with responses by `request_id`; nothing else is shared.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RemotePayload;

/// Messages sent from the host to a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToContext {
    /// A pending load was assigned to this context.
    Assign { worker_id: u32, url: String },
    /// No load was pending when the context reported in.
    Reject { reason: String },
    Call {
        request_id: u64,
        service: String,
        method: String,
        args: Vec<Value>,
    },
    Shutdown,
}

/// Messages sent from a context to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToHost {
    /// The context has started and wants a module to load.
    Hello,
    RegisterService {
        service: String,
    },
    InitComplete {
        worker_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemotePayload>,
    },
    Response {
        request_id: u64,
        result: std::result::Result<Value, RemotePayload>,
    },
}

/// Host side of a context channel.
pub struct HostEnd {
    pub tx: mpsc::UnboundedSender<ToContext>,
    pub rx: mpsc::UnboundedReceiver<ToHost>,
}

/// Context side of a context channel.
pub struct ContextEnd {
    pub tx: mpsc::UnboundedSender<ToHost>,
    pub rx: mpsc::UnboundedReceiver<ToContext>,
}

/// Create a connected pair of channel ends.
pub fn pair() -> (HostEnd, ContextEnd) {
    let (to_context_tx, to_context_rx) = mpsc::unbounded_channel();
    let (to_host_tx, to_host_rx) = mpsc::unbounded_channel();
    (
        HostEnd {
            tx: to_context_tx,
            rx: to_host_rx,
        },
        ContextEnd {
            tx: to_host_tx,
            rx: to_context_rx,
        },
    )
}
