//! Off-thread execution of encode and decode requests.
//!
//! Every request gets a freshly spawned worker thread that handles exactly
//! that request and then exits; workers are never pooled or reused. All
//! workers post their single reply on one shared channel, and a router task
//! hands each reply to the caller registered under the same correlation id.
//! Replies whose id is not pending are dropped.
//!
//! Per request: `Created -> Dispatched -> Resolved | Rejected -> Terminated`.
//! The worker is torn down on every exit path, including a caller that stops
//! waiting.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::aead::secure_random;
use crate::error::{PhantomError, Result};

/// Random bytes in a correlation id.
const ID_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encode,
    Decode,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Encode => write!(f, "encode"),
            Operation::Decode => write!(f, "decode"),
        }
    }
}

/// Correlation id, unique among requests in flight on one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    fn generate() -> Result<Self> {
        let mut buf = [0u8; ID_LEN];
        secure_random(&mut buf)?;

        Ok(Self(buf.iter().map(|b| format!("{b:02x}")).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a worker receives. The password lives only as long as the request.
pub struct DispatchRequest {
    pub id: RequestId,
    pub operation: Operation,
    pub payload: String,
    password: Zeroizing<String>,
}

impl fmt::Debug for DispatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRequest")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("payload_len", &self.payload.len())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What a worker sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResponse {
    pub fn resolved(id: RequestId, result: String) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn rejected(id: RequestId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Failures keep the worker's message inside [`PhantomError::Dispatch`].
    pub fn into_result(self) -> Result<String> {
        match (self.success, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(PhantomError::Dispatch(
                self.error
                    .unwrap_or_else(|| "worker returned no result".to_string()),
            )),
        }
    }
}

/// Work performed on the worker thread.
pub type Handler = fn(Operation, &str, &str) -> Result<String>;

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<DispatchResponse>>>>;

pub struct Dispatcher {
    pending: Pending,
    replies: mpsc::UnboundedSender<DispatchResponse>,
    active: Arc<AtomicUsize>,
    handler: Handler,
    router: JoinHandle<()>,
}

impl Dispatcher {
    /// Creates a dispatcher running [`crate::process`] on its workers.
    ///
    /// # Errors
    ///
    /// Returns [`PhantomError::Dispatch`] when called outside a Tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_handler(crate::process)
    }

    pub fn with_handler(handler: Handler) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| PhantomError::Dispatch("no Tokio runtime is running".to_string()))?;

        let pending = Pending::default();
        let (replies, inbox) = mpsc::unbounded_channel();
        let router = runtime.spawn(route_replies(inbox, Arc::clone(&pending)));

        Ok(Self {
            pending,
            replies,
            active: Arc::default(),
            handler,
            router,
        })
    }

    /// Requests waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Worker threads that have not finished yet.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Runs one operation on a dedicated worker and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`PhantomError::Dispatch`] if the worker cannot be started,
    /// crashes, or reports a failure; the worker's message is preserved.
    pub async fn dispatch(
        &self,
        operation: Operation,
        payload: impl Into<String>,
        password: Zeroizing<String>,
    ) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = self.register(reply_tx)?;
        let _slot = PendingSlot {
            id: &id,
            pending: &self.pending,
        };

        let request = DispatchRequest {
            id: id.clone(),
            operation,
            payload: payload.into(),
            password,
        };
        let worker = Worker::spawn(
            request,
            self.handler,
            self.replies.clone(),
            Arc::clone(&self.active),
        )?;
        debug!(%id, %operation, "request dispatched");

        let outcome = match reply_rx.await {
            Ok(reply) => reply.into_result(),
            Err(_) => Err(PhantomError::Dispatch(
                "reply channel closed before the worker answered".to_string(),
            )),
        };
        match &outcome {
            Ok(_) => debug!(%id, "request resolved"),
            Err(e) => debug!(%id, error = %e, "request rejected"),
        }

        worker.terminate().await;
        outcome
    }

    fn register(&self, reply: oneshot::Sender<DispatchResponse>) -> Result<RequestId> {
        let mut pending = self.pending.lock();

        let id = loop {
            let candidate = RequestId::generate()?;
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(id.clone(), reply);

        Ok(id)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn route_replies(mut inbox: mpsc::UnboundedReceiver<DispatchResponse>, pending: Pending) {
    while let Some(reply) = inbox.recv().await {
        let waiter = pending.lock().remove(&reply.id);

        match waiter {
            Some(waiter) => {
                if waiter.send(reply).is_err() {
                    debug!("caller stopped waiting, reply dropped");
                }
            }
            None => warn!(id = %reply.id, "ignoring reply with unknown correlation id"),
        }
    }
}

/// Removes the correlation entry when the call ends, however it ends.
struct PendingSlot<'a> {
    id: &'a RequestId,
    pending: &'a Pending,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

/// Handle to one single-use worker thread.
struct Worker {
    id: RequestId,
    exited: Option<oneshot::Receiver<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Owned by the worker thread; dropping it marks the worker as gone.
///
/// A worker that unwinds before answering still posts a rejection, so the
/// caller always gets exactly one reply.
struct Liveness {
    id: RequestId,
    replies: mpsc::UnboundedSender<DispatchResponse>,
    replied: bool,
    active: Arc<AtomicUsize>,
    _exited: oneshot::Sender<()>,
}

impl Liveness {
    fn reply(&mut self, response: DispatchResponse) {
        self.replied = true;
        // Fails only when the dispatcher is gone.
        let _ = self.replies.send(response);
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        if !self.replied {
            warn!(id = %self.id, "worker exited without replying");
            let _ = self.replies.send(DispatchResponse::rejected(
                self.id.clone(),
                "worker exited without replying",
            ));
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Worker {
    fn spawn(
        request: DispatchRequest,
        handler: Handler,
        replies: mpsc::UnboundedSender<DispatchResponse>,
        active: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let id = request.id.clone();
        let (exited_tx, exited_rx) = oneshot::channel();

        active.fetch_add(1, Ordering::SeqCst);
        let mut liveness = Liveness {
            id: id.clone(),
            replies,
            replied: false,
            active,
            _exited: exited_tx,
        };

        let thread = thread::Builder::new()
            .name(format!("phantom-worker-{id}"))
            .spawn(move || {
                let reply = run(handler, request);
                liveness.reply(reply);
            })
            .map_err(|e| PhantomError::Dispatch(format!("failed to start worker: {e}")))?;

        Ok(Self {
            id,
            exited: Some(exited_rx),
            thread: Some(thread),
        })
    }

    async fn terminate(mut self) {
        if let Some(exited) = self.exited.take() {
            let _ = exited.await;
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
        debug!(id = %self.id, "worker terminated");
    }
}

fn run(handler: Handler, request: DispatchRequest) -> DispatchResponse {
    let DispatchRequest {
        id,
        operation,
        payload,
        password,
    } = request;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler(operation, &payload, &password)
    }));

    match outcome {
        Ok(Ok(result)) => DispatchResponse::resolved(id, result),
        Ok(Err(e)) => DispatchResponse::rejected(id, e.to_string()),
        Err(panic) => {
            let message = panic_message(&*panic);
            warn!(%id, "worker crashed: {message}");
            DispatchResponse::rejected(id, format!("worker crashed: {message}"))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
