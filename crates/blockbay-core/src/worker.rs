//! Isolated context lifecycle.
//!
//! Loading an extension from a URL runs it in an isolated context that the
//! host only reaches through a [`channel`](crate::channel). The host side
//! keeps a FIFO of pending loads; when a context reports in it is handed the
//! oldest one, and the load resolves once the context reports that its
//! module initialised (or failed to).
//!
//! ```text
//!  enqueue(url) ──► pending_extensions ──allocate_worker()──► pending_workers
//!                                                                  │
//!                                   on_worker_init(id, error) ◄────┘
//! ```
//!
//! There is no timeout: a context that never reports leaves its load
//! pending.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::channel::{ContextEnd, ToContext, ToHost};
use crate::dispatch::OperationTable;
use crate::error::{Error, RemotePayload, Result};
use crate::module::{extension_operations, ExtensionModule};
use crate::registry::service_name;

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Handed a pending load.
    Allocated,
    /// Told about its load and expected to report back.
    AwaitingInit,
    Ready,
    Failed,
}

struct PendingLoad {
    url: String,
    responder: oneshot::Sender<Result<u32>>,
}

/// Host-side bookkeeping for isolated contexts.
pub struct WorkerManager {
    ids: Arc<AtomicU32>,
    pending_extensions: VecDeque<PendingLoad>,
    pending_workers: HashMap<u32, PendingLoad>,
    contexts: HashMap<u32, ContextState>,
}

impl WorkerManager {
    /// `ids` is shared with the registry so worker ids and service names
    /// never collide.
    pub fn new(ids: Arc<AtomicU32>) -> Self {
        Self {
            ids,
            pending_extensions: VecDeque::new(),
            pending_workers: HashMap::new(),
            contexts: HashMap::new(),
        }
    }

    /// Queue a load. The receiver yields the worker id once the context's
    /// module initialised.
    pub fn enqueue(&mut self, url: impl Into<String>) -> oneshot::Receiver<Result<u32>> {
        let (responder, receiver) = oneshot::channel();
        self.pending_extensions.push_back(PendingLoad {
            url: url.into(),
            responder,
        });
        receiver
    }

    /// Assign the oldest pending load to a new context.
    ///
    /// Returns `None` without consuming an id when nothing is pending.
    pub fn allocate_worker(&mut self) -> Option<(u32, String)> {
        let load = self.pending_extensions.pop_front()?;
        let id = self.ids.fetch_add(1, Ordering::SeqCst);
        let url = load.url.clone();
        self.pending_workers.insert(id, load);
        self.contexts.insert(id, ContextState::Allocated);
        debug!(worker_id = id, url = %url, "Allocated worker");
        Some((id, url))
    }

    pub fn mark_awaiting_init(&mut self, id: u32) {
        if let Some(state) = self.contexts.get_mut(&id) {
            *state = ContextState::AwaitingInit;
        }
    }

    /// Settle the load assigned to a context. Returns `false` for ids that
    /// have no pending load.
    pub fn on_worker_init(&mut self, id: u32, error: Option<RemotePayload>) -> bool {
        let Some(load) = self.pending_workers.remove(&id) else {
            warn!(worker_id = id, "Init report from unknown worker");
            return false;
        };

        let (state, outcome) = match error {
            None => {
                info!(worker_id = id, url = %load.url, "Extension worker ready");
                (ContextState::Ready, Ok(id))
            }
            Some(payload) => {
                warn!(worker_id = id, url = %load.url, error = %payload, "Extension worker failed");
                (ContextState::Failed, Err(Error::Remote(payload)))
            }
        };
        self.contexts.insert(id, state);
        // The loader may have given up waiting.
        let _ = load.responder.send(outcome);
        true
    }

    pub fn state(&self, id: u32) -> Option<ContextState> {
        self.contexts.get(&id).copied()
    }

    pub fn pending_load_count(&self) -> usize {
        self.pending_extensions.len()
    }

    pub fn pending_worker_count(&self) -> usize {
        self.pending_workers.len()
    }

    /// Drop every pending load; waiting loaders observe a closed channel.
    pub fn clear(&mut self) {
        self.pending_extensions.clear();
        self.pending_workers.clear();
        self.contexts.clear();
    }
}

// ============================================================================
// Context side
// ============================================================================

/// Resolves a URL to an extension module inside an isolated context.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Arc<dyn ExtensionModule>>;
}

/// Starts isolated contexts.
pub trait ContextSpawner: Send + Sync {
    fn spawn(&self, end: ContextEnd);
}

/// Runs each context as a tokio task.
pub struct TaskSpawner {
    loader: Arc<dyn ModuleLoader>,
}

impl TaskSpawner {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self { loader }
    }
}

impl ContextSpawner for TaskSpawner {
    fn spawn(&self, end: ContextEnd) {
        tokio::spawn(run_context(end, self.loader.clone()));
    }
}

/// Body of an isolated context.
///
/// Reports in, loads whatever it was assigned, registers the module's
/// service and then answers calls until shut down.
pub async fn run_context(end: ContextEnd, loader: Arc<dyn ModuleLoader>) {
    let ContextEnd { tx, mut rx } = end;
    if tx.send(ToHost::Hello).is_err() {
        return;
    }

    let (worker_id, url) = match rx.recv().await {
        Some(ToContext::Assign { worker_id, url }) => (worker_id, url),
        Some(ToContext::Reject { reason }) => {
            debug!(reason = %reason, "Context rejected");
            return;
        }
        _ => return,
    };

    let module = match loader.load(&url).await {
        Ok(module) => module,
        Err(err) => {
            let _ = tx.send(ToHost::InitComplete {
                worker_id,
                error: Some(RemotePayload::from(&err)),
            });
            return;
        }
    };

    let service = service_name(worker_id, &module.info().id);
    let operations = extension_operations(module);
    if tx
        .send(ToHost::RegisterService {
            service: service.clone(),
        })
        .is_err()
    {
        return;
    }
    let _ = tx.send(ToHost::InitComplete {
        worker_id,
        error: None,
    });

    serve(tx, rx, &service, operations).await;
}

async fn serve(
    tx: tokio::sync::mpsc::UnboundedSender<ToHost>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<ToContext>,
    service: &str,
    operations: OperationTable,
) {
    while let Some(message) = rx.recv().await {
        match message {
            ToContext::Call {
                request_id,
                method,
                args,
                ..
            } => {
                let result = match operations.invoke(service, &method, &args) {
                    Ok(value) => Ok(value),
                    Err(err @ Error::MethodNotFound { .. }) => {
                        warn!(error = %err, "Ignoring call");
                        Ok(Value::Null)
                    }
                    Err(err) => Err(RemotePayload::from(&err)),
                };
                if tx.send(ToHost::Response { request_id, result }).is_err() {
                    break;
                }
            }
            ToContext::Shutdown => break,
            other => debug!(message = ?other, "Unexpected message in running context"),
        }
    }
    debug!(service = %service, "Context stopped");
}
