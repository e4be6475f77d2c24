//! Call dispatcher.
//!
//! Maps service names to endpoints. A service is either LOCAL (an
//! [`OperationTable`] living in the host) or REMOTE (an isolated context
//! reached through a [`RemoteLink`]). Callers never need to know which:
//! [`Callable::call`] returns a future in both cases, and a local result is
//! already resolved when the future is created.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::channel::ToContext;
use crate::error::{Error, RemotePayload, Result};

/// Operation every module service answers with its metadata.
pub const GET_INFO: &str = "getInfo";

/// Local operation handler.
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Future returned by every dispatched call.
pub type DispatchFuture = BoxFuture<'static, Result<Value>>;

// ============================================================================
// Operation tables
// ============================================================================

/// Named operations of a local service.
#[derive(Clone, Default)]
pub struct OperationTable {
    handlers: HashMap<String, Handler>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, handler);
        self
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run an operation by name.
    pub fn invoke(&self, service: &str, name: &str, args: &[Value]) -> Result<Value> {
        match self.handlers.get(name) {
            Some(handler) => handler(args),
            None => Err(Error::MethodNotFound {
                service: service.to_string(),
                method: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("OperationTable")
            .field("operations", &names)
            .finish()
    }
}

// ============================================================================
// Remote link
// ============================================================================

type PendingReply = oneshot::Sender<std::result::Result<Value, RemotePayload>>;

struct LinkInner {
    tx: mpsc::UnboundedSender<ToContext>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_request: AtomicU64,
}

/// Host-side handle to an isolated context.
#[derive(Clone)]
pub struct RemoteLink {
    inner: Arc<LinkInner>,
}

impl RemoteLink {
    pub fn new(tx: mpsc::UnboundedSender<ToContext>) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                tx,
                pending: Mutex::new(HashMap::new()),
                next_request: AtomicU64::new(0),
            }),
        }
    }

    /// Send a message that expects no reply.
    pub fn send(&self, message: ToContext) -> Result<()> {
        self.inner
            .tx
            .send(message)
            .map_err(|_| Error::ChannelClosed("isolated context".to_string()))
    }

    /// Post a call and wait for the correlated response.
    pub fn call(&self, service: String, method: String, args: Vec<Value>) -> DispatchFuture {
        let request_id = self.inner.next_request.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id, reply_tx);

        let message = ToContext::Call {
            request_id,
            service: service.clone(),
            method,
            args,
        };
        if self.inner.tx.send(message).is_err() {
            self.inner.pending.lock().remove(&request_id);
            return future::ready(Err(Error::ChannelClosed(service))).boxed();
        }

        async move {
            match reply_rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(payload)) => Err(Error::Remote(payload)),
                Err(_) => Err(Error::ChannelClosed(service)),
            }
        }
        .boxed()
    }

    /// Complete a pending call. Returns `false` for unknown request ids.
    pub fn resolve(
        &self,
        request_id: u64,
        result: std::result::Result<Value, RemotePayload>,
    ) -> bool {
        match self.inner.pending.lock().remove(&request_id) {
            Some(reply) => {
                // The caller may have stopped waiting.
                let _ = reply.send(result);
                true
            }
            None => false,
        }
    }

    /// Fail every call still waiting for a response.
    pub fn close(&self) {
        let dropped = {
            let mut pending = self.inner.pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            debug!(dropped, "Closed remote link with calls in flight");
        }
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }
}

impl fmt::Debug for RemoteLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLink")
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

// ============================================================================
// Bindings and callables
// ============================================================================

/// Where a service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
enum Endpoint {
    Local(Arc<OperationTable>),
    Remote(RemoteLink),
}

/// A named service and its endpoint.
#[derive(Debug, Clone)]
pub struct ServiceBinding {
    service_name: String,
    endpoint: Endpoint,
}

impl ServiceBinding {
    pub fn local(service_name: impl Into<String>, operations: OperationTable) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: Endpoint::Local(Arc::new(operations)),
        }
    }

    pub fn remote(service_name: impl Into<String>, link: RemoteLink) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: Endpoint::Remote(link),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn locality(&self) -> Locality {
        match self.endpoint {
            Endpoint::Local(_) => Locality::Local,
            Endpoint::Remote(_) => Locality::Remote,
        }
    }

    /// Bind a method once; the result can be called any number of times.
    ///
    /// A local method that does not exist becomes a no-op callable.
    pub fn resolve(&self, method: &str) -> Callable {
        match &self.endpoint {
            Endpoint::Local(table) => match table.get(method) {
                Some(handler) => Callable::Local(handler.clone()),
                None => {
                    warn!(
                        service = %self.service_name,
                        method,
                        "Could not find method on local service; calls will do nothing"
                    );
                    Callable::Missing {
                        service: self.service_name.clone(),
                        method: method.to_string(),
                    }
                }
            },
            Endpoint::Remote(link) => Callable::Remote {
                link: link.clone(),
                service: self.service_name.clone(),
                method: method.to_string(),
            },
        }
    }
}

/// A method bound to its service.
#[derive(Clone)]
pub enum Callable {
    Local(Handler),
    Remote {
        link: RemoteLink,
        service: String,
        method: String,
    },
    /// Local method that was absent at bind time.
    Missing { service: String, method: String },
}

impl Callable {
    pub fn locality(&self) -> Locality {
        match self {
            Self::Remote { .. } => Locality::Remote,
            Self::Local(_) | Self::Missing { .. } => Locality::Local,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    /// Invoke the method. Local results are ready immediately.
    pub fn call(&self, args: Vec<Value>) -> DispatchFuture {
        match self {
            Self::Local(handler) => future::ready(handler(&args)).boxed(),
            Self::Remote {
                link,
                service,
                method,
            } => link.call(service.clone(), method.clone(), args),
            Self::Missing { service, method } => {
                debug!(service = %service, method = %method, "Ignoring call to missing method");
                future::ready(Ok(Value::Null)).boxed()
            }
        }
    }

    /// Invoke the method synchronously. Remote methods refuse.
    pub fn call_sync(&self, args: &[Value]) -> Result<Value> {
        match self {
            Self::Local(handler) => handler(args),
            Self::Remote { service, .. } => Err(Error::SyncOnRemote(service.clone())),
            Self::Missing { .. } => Ok(Value::Null),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Callable::Local"),
            Self::Remote {
                service, method, ..
            } => write!(f, "Callable::Remote({service}.{method})"),
            Self::Missing { service, method } => write!(f, "Callable::Missing({service}.{method})"),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Service name to endpoint table.
#[derive(Default)]
pub struct Dispatcher {
    services: RwLock<HashMap<String, ServiceBinding>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a binding, replacing any binding with the same name.
    pub fn set_service(&self, binding: ServiceBinding) {
        let name = binding.service_name.clone();
        let locality = binding.locality();
        if self.services.write().insert(name.clone(), binding).is_some() {
            warn!(service = %name, "Replacing existing service binding");
        }
        debug!(service = %name, ?locality, "Service bound");
    }

    pub fn set_local_service(&self, service_name: &str, operations: OperationTable) {
        self.set_service(ServiceBinding::local(service_name, operations));
    }

    pub fn set_remote_service(&self, service_name: &str, link: RemoteLink) {
        self.set_service(ServiceBinding::remote(service_name, link));
    }

    pub fn remove_service(&self, service_name: &str) -> bool {
        self.services.write().remove(service_name).is_some()
    }

    pub fn has_service(&self, service_name: &str) -> bool {
        self.services.read().contains_key(service_name)
    }

    pub fn is_remote_service(&self, service_name: &str) -> Result<bool> {
        Ok(self.binding(service_name)?.locality() == Locality::Remote)
    }

    pub fn binding(&self, service_name: &str) -> Result<ServiceBinding> {
        self.services
            .read()
            .get(service_name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(service_name.to_string()))
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Call a method on any service.
    pub fn call(&self, service_name: &str, method: &str, args: Vec<Value>) -> DispatchFuture {
        match self.binding(service_name) {
            Ok(binding) => binding.resolve(method).call(args),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    /// Call a method on a local service and return its result directly.
    pub fn call_sync(&self, service_name: &str, method: &str, args: &[Value]) -> Result<Value> {
        self.binding(service_name)?.resolve(method).call_sync(args)
    }

    pub fn clear(&self) {
        self.services.write().clear();
    }
}
