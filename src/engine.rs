//! Mercury engine: request/subscribe facade and the dispatch loop.
//!
//! The [`EngineBuilder`] configures timeouts, queue sizes and routing policy.
//! [`EngineBuilder::start`] takes the two halves of an authenticated
//! connection and spawns:
//! 1. The writer task (all outbound frames)
//! 2. The dispatch loop (the only reader of the connection)
//!
//! The returned [`Engine`] is a cheap clonable handle. Every operation on it
//! is synchronous: it registers state, queues a frame and returns.
//! Completion and push callbacks run on the dispatch loop and may call back
//! into the engine.
//!
//! # Example
//!
//! ```ignore
//! use mercury_client::{Engine, MercuryMethod};
//!
//! let engine = Engine::builder().start(reader, writer);
//!
//! engine.subscribe(
//!     "hm://remote/user/alice/",
//!     |push| println!("push for {:?}", push.uri()),
//!     |ack| println!("subscribed: {}", ack.is_ok()),
//! )?;
//!
//! let reply = engine
//!     .execute_async(MercuryMethod::Get, "hm://metadata/track/abc", vec![])
//!     .await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::error::{MercuryError, Result};
use crate::protocol::{
    classify, command, Frame, HeaderCodec, InboundKind, MercuryMethod, MercuryRequest,
    MercuryResponse, ProtobufHeaderCodec, SequenceId,
};
use crate::registry::{
    CallbackRegistry, MatchPolicy, PushCallback, ResponseCallback, SubscriptionRegistry,
};
use crate::transport::{PacketSink, PacketSource};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default deadline for an unanswered request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why the dispatch loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The remote closed the connection.
    Closed,
    /// The connection failed with an error.
    Failed(String),
}

type TerminateHook = Box<dyn FnOnce(&Termination) + Send + 'static>;

/// Builder for configuring and starting an [`Engine`].
pub struct EngineBuilder {
    request_timeout: Option<Duration>,
    channel_capacity: usize,
    match_policy: MatchPolicy,
    header_codec: Arc<dyn HeaderCodec>,
    on_terminate: Option<TerminateHook>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            match_policy: MatchPolicy::default(),
            header_codec: Arc::new(ProtobufHeaderCodec),
            on_terminate: None,
        }
    }

    /// Set the deadline after which an unanswered request fails with
    /// [`MercuryError::Timeout`]. `None` disables the timer.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the outbound queue capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set how push URIs are matched against subscriptions.
    ///
    /// Default: [`MatchPolicy::Exact`]
    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Replace the header serializer.
    pub fn header_codec(mut self, codec: impl HeaderCodec) -> Self {
        self.header_codec = Arc::new(codec);
        self
    }

    /// Register a hook run once when the dispatch loop stops.
    pub fn on_terminate<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Termination) + Send + 'static,
    {
        self.on_terminate = Some(Box::new(hook));
        self
    }

    /// Spawn the writer task and dispatch loop over an authenticated connection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R, W>(self, source: R, sink: W) -> Engine
    where
        R: PacketSource,
        W: PacketSink,
    {
        let (writer, writer_task) = spawn_writer_task(sink, self.channel_capacity);
        let (terminated_tx, terminated_rx) = watch::channel(None);

        let shared = Arc::new(Shared {
            callbacks: CallbackRegistry::new(),
            subscriptions: SubscriptionRegistry::new(self.match_policy),
            codec: self.header_codec,
            request_timeout: self.request_timeout,
            protocol_errors: AtomicU64::new(0),
            runtime: Handle::current(),
        });

        let loop_shared = shared.clone();
        let loop_writer = writer.clone();
        let on_terminate = self.on_terminate;

        tokio::spawn(async move {
            let termination =
                dispatch_loop(source, writer_task, &loop_shared, &loop_writer).await;
            match &termination {
                Termination::Closed => tracing::info!("Mercury connection closed"),
                Termination::Failed(reason) => {
                    tracing::error!("Mercury dispatch loop failed: {}", reason)
                }
            }

            let orphaned = loop_shared.callbacks.close();
            if !orphaned.is_empty() {
                tracing::debug!(count = orphaned.len(), "Failing outstanding requests");
            }
            for (_, callback) in orphaned {
                callback(Err(MercuryError::ConnectionClosed));
            }

            if let Some(hook) = on_terminate {
                hook(&termination);
            }
            let _ = terminated_tx.send(Some(termination));
        });

        Engine {
            shared,
            writer,
            terminated: terminated_rx,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by every engine handle, the dispatch loop and request timers.
struct Shared {
    callbacks: CallbackRegistry,
    subscriptions: SubscriptionRegistry,
    codec: Arc<dyn HeaderCodec>,
    request_timeout: Option<Duration>,
    protocol_errors: AtomicU64,
    runtime: Handle,
}

/// Handle to a running Mercury engine.
///
/// Clones share the same connection and registries.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
    writer: WriterHandle,
    terminated: watch::Receiver<Option<Termination>>,
}

impl Engine {
    /// Create a new engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Issue a request. `on_complete` runs once, with the reply, a timeout,
    /// or [`MercuryError::ConnectionClosed`].
    ///
    /// Returns the allocated sequence id, usable with [`Engine::cancel`].
    pub fn request<F>(
        &self,
        method: MercuryMethod,
        uri: &str,
        parts: Vec<Bytes>,
        on_complete: F,
    ) -> Result<SequenceId>
    where
        F: FnOnce(Result<MercuryResponse>) + Send + 'static,
    {
        self.originate(MercuryRequest::new(method, uri, parts), Box::new(on_complete))
    }

    /// Issue a request and wait for its reply.
    pub async fn execute_async(
        &self,
        method: MercuryMethod,
        uri: &str,
        parts: Vec<Bytes>,
    ) -> Result<MercuryResponse> {
        let (tx, rx) = oneshot::channel();
        self.request(method, uri, parts, move |result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| MercuryError::ConnectionClosed)?
    }

    /// Subscribe to pushes for `uri`.
    ///
    /// `on_push` is registered locally at once and stays live until
    /// [`Engine::unsubscribe`]; an existing subscription for the same URI is
    /// replaced. `on_ack` runs once with the remote's answer to the SUB.
    pub fn subscribe<P, A>(&self, uri: &str, on_push: P, on_ack: A) -> Result<SequenceId>
    where
        P: Fn(&MercuryResponse) + Send + Sync + 'static,
        A: FnOnce(Result<MercuryResponse>) + Send + 'static,
    {
        let subscriptions = &self.shared.subscriptions;
        let callback: PushCallback = Arc::new(on_push);
        let displaced = subscriptions.subscribe(uri, callback.clone());
        let result = self.originate(
            MercuryRequest::new(MercuryMethod::Sub, uri, Vec::new()),
            Box::new(on_ack),
        );
        if result.is_err() {
            // SUB never sent: leave the table as it was
            subscriptions.restore(uri, &callback, displaced);
        }
        result
    }

    /// Drop the subscription for `uri` and tell the remote.
    pub fn unsubscribe(&self, uri: &str) -> Result<SequenceId> {
        if !self.shared.subscriptions.unsubscribe(uri) {
            tracing::debug!(uri, "Unsubscribing from URI with no local subscription");
        }
        let owned_uri = uri.to_string();
        self.originate(
            MercuryRequest::new(MercuryMethod::Unsub, uri, Vec::new()),
            Box::new(move |result| match result {
                Ok(_) => tracing::debug!(uri = %owned_uri, "Unsubscribe acknowledged"),
                Err(e) => tracing::debug!(uri = %owned_uri, "Unsubscribe not acknowledged: {}", e),
            }),
        )
    }

    /// Forget a pending request without running its callback.
    ///
    /// A reply arriving later is dropped. Returns whether the request was
    /// still pending.
    pub fn cancel(&self, sequence_id: SequenceId) -> bool {
        self.shared.callbacks.cancel(sequence_id)
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.callbacks.len()
    }

    /// Currently subscribed URIs.
    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.subscriptions.uris()
    }

    /// Count of inbound frames discarded as malformed or unknown.
    pub fn protocol_errors(&self) -> u64 {
        self.shared.protocol_errors.load(Ordering::Relaxed)
    }

    /// Termination reason, if the dispatch loop has stopped.
    pub fn termination(&self) -> Option<Termination> {
        self.terminated.borrow().clone()
    }

    /// Wait until the dispatch loop stops.
    pub async fn closed(&self) -> Termination {
        let mut rx = self.terminated.clone();
        let termination = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            // sender dropped without reporting: the loop task was torn down
            Err(_) => None,
        };
        termination.unwrap_or_else(|| Termination::Failed("dispatch loop aborted".to_string()))
    }

    fn originate(&self, request: MercuryRequest, callback: ResponseCallback) -> Result<SequenceId> {
        let shared = &self.shared;
        let sequence_id = shared.callbacks.allocate_and_register(callback)?;

        let sent = request
            .encode(sequence_id, shared.codec.as_ref())
            .and_then(|frame| self.writer.try_send(frame));
        if let Err(e) = sent {
            shared.callbacks.cancel(sequence_id);
            return Err(e);
        }

        tracing::debug!(
            sequence_id,
            method = %request.method,
            uri = %request.uri,
            "Sent mercury request"
        );
        self.arm_timer(sequence_id);
        Ok(sequence_id)
    }

    fn arm_timer(&self, sequence_id: SequenceId) {
        let Some(timeout) = self.shared.request_timeout else {
            return;
        };
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let timer = self.shared.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if let Some(callback) = shared.callbacks.take_callback(sequence_id) {
                tracing::warn!(sequence_id, "Mercury request timed out");
                callback(Err(MercuryError::Timeout(sequence_id)));
            }
        });
        self.shared
            .callbacks
            .attach_timer(sequence_id, timer.abort_handle());
    }
}

/// Read frames until the connection goes away, in either direction.
async fn dispatch_loop<R: PacketSource>(
    mut source: R,
    mut writer_task: JoinHandle<Result<()>>,
    shared: &Shared,
    writer: &WriterHandle,
) -> Termination {
    loop {
        let received = tokio::select! {
            received = source.recv_packet() => received,
            outcome = &mut writer_task => return writer_stopped(outcome),
        };
        let frame = match received {
            Ok(frame) => frame,
            Err(MercuryError::ConnectionClosed) => return Termination::Closed,
            Err(e) => return Termination::Failed(e.to_string()),
        };

        match dispatch_frame(frame, shared, writer) {
            Ok(()) => {}
            Err(e) if e.is_transport() => {
                // the writer is gone; its task outcome ends the loop
                tracing::warn!("Could not answer keepalive: {}", e);
            }
            Err(MercuryError::Backpressure) => {
                shared.protocol_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropping pong, outbound queue full");
            }
            Err(e) => {
                shared.protocol_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Discarding inbound frame: {}", e);
            }
        }
    }
}

/// Termination for a writer task that ended while the loop was running.
fn writer_stopped(outcome: std::result::Result<Result<()>, JoinError>) -> Termination {
    let reason = match outcome {
        Ok(Ok(())) => "writer stopped".to_string(),
        Ok(Err(e)) => format!("write failed: {}", e),
        Err(e) => format!("writer task failed: {}", e),
    };
    Termination::Failed(reason)
}

/// Route a single inbound frame.
fn dispatch_frame(frame: Frame, shared: &Shared, writer: &WriterHandle) -> Result<()> {
    match classify(frame.command) {
        InboundKind::Ping => {
            tracing::debug!("Received ping, sending pong");
            writer.try_send(Frame::new(command::PONG, frame.payload))
        }
        InboundKind::Reply => {
            let response = MercuryResponse::decode(&frame.payload, shared.codec.as_ref())?;
            let sequence_id = response.sequence_id;
            match shared.callbacks.take_callback(sequence_id) {
                Some(callback) => callback(Ok(response)),
                None => tracing::debug!(sequence_id, "Dropping unmatched response"),
            }
            Ok(())
        }
        InboundKind::Push => {
            let response = MercuryResponse::decode(&frame.payload, shared.codec.as_ref())?;
            let Some(uri) = response.uri() else {
                return Err(MercuryError::Protocol("Push without URI".to_string()));
            };
            match shared.subscriptions.lookup(uri) {
                Some(callback) => callback(&response),
                None => tracing::debug!(uri, "Dropping push for unsubscribed URI"),
            }
            Ok(())
        }
        InboundKind::Unknown(command) => Err(MercuryError::Protocol(format!(
            "Unknown command 0x{:02x}",
            command
        ))),
    }
}
