use crate::deferred::Deferred;
use crate::errors::{HandlerError, MqError};
use crate::macros::*;
use crate::message::{Message, Reply};
use crate::sync::*;

/// What a consumer handler returns: an optional response to send back to the producer, or an
/// error to reject the producer's [`Deferred`] with.
pub type HandlerResult = Result<Option<serde_json::Value>, HandlerError>;

/// A handler attached to a single `receive` call.
pub type Handler = Box<dyn FnOnce(&Message) -> HandlerResult + Send>;

/// A handler attached to a consumer, called for every message no pending `receive` claims.
pub type Listener = std::sync::Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// A point-to-point destination which matches sent messages with `receive` calls.
///
/// # Implementation details
///
/// A queue holds two FIFO buffers: messages which were sent before anyone was there to receive
/// them, and waiters, which are `receive` calls made before any message was there to satisfy them.
///
/// ```text
///                    ┌───┬───┬───┐
///  send ────────────►│ m │ m │ m │────────────► receive
///                    └───┴───┴───┘
///                       messages
///
///                    ┌───┬───┬───┐
///  send ◄────────────│ w │ w │ w │◄──────────── receive
///                    └───┴───┴───┘
///                       waiters
/// ```
///
/// Every send first tries to pop a waiter and every receive first tries to pop a message, buffering
/// itself on its own side only if the other side is empty. Both buffers live behind a single lock
/// which covers the whole match-or-buffer decision, so that at any point at least one of them is
/// empty, and messages and waiters are each matched in the order in which they arrived.
///
/// Consumer handlers are always called _after_ that lock has been released. They are free to send
/// to or receive from the same queue.
///
/// ## Expiration
///
/// Message expiration is only ever checked when a receive scans the head of the message buffer:
/// expired messages found there are silently dropped. Their producer is never notified and its
/// [`Deferred`] stays pending. There is no background sweep, so an expired message which is never
/// scanned stays buffered until the queue is closed.
pub struct Queue {
    name: String,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    messages: std::collections::VecDeque<Pending>,
    waiters: std::collections::VecDeque<Waiter>,
    listener: Option<Listener>,
    closed: bool,
}

/// A buffered message and the [`Deferred`] its producer is waiting on.
struct Pending {
    message: Message,
    reply: Deferred<Reply>,
}

/// A `receive` call waiting on a message.
pub(crate) struct Waiter {
    delivery: Deferred<Message>,
    handler: Option<Handler>,
}

/// The consumer side a message is about to be handed to.
pub(crate) enum Target {
    Waiter(Waiter),
    Listener(Listener),
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("messages", &state.messages.len())
            .field("waiters", &state.waiters.len())
            .field("listener", &state.listener.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: Mutex::new(QueueState::default()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hands `message` to the oldest pending waiter (or to the listener, if no waiter is pending)
    /// or buffers it until a consumer asks for it. The returned [`Deferred`] settles once a
    /// consumer has handled the message.
    pub fn enqueue_message(&self, message: Message) -> Result<Deferred<Reply>, MqError> {
        let reply = Deferred::new();
        self.enqueue(message, reply.clone())?;
        Ok(reply)
    }

    #[cfg_attr(test, tracing::instrument(skip_all, fields(queue = %self.name, id = %message.id())))]
    pub(crate) fn enqueue(&self, message: Message, reply: Deferred<Reply>) -> Result<(), MqError> {
        let mut state = lock(&self.state);
        if state.closed {
            error!("Tried to send to a closed queue");
            return Err(MqError::Closed(self.name.clone()));
        }

        match state.next_target() {
            Some(target) => {
                drop(state);
                debug!("Consumer ready, delivering message");
                target.deliver(message, &reply);
            }
            None => {
                state.messages.push_back(Pending { message, reply });
                debug!(pending = state.messages.len(), "No consumer ready, buffering message");
            }
        }

        Ok(())
    }

    /// Pops the consumer which is ready to take a message right now, if any.
    pub(crate) fn take_target(&self) -> Option<Target> {
        let mut state = lock(&self.state);
        if state.closed { None } else { state.next_target() }
    }

    /// Takes the oldest buffered message which has not expired, or registers a new waiter if there
    /// is none. The returned [`Deferred`] resolves to the received message.
    ///
    /// If set, `handler` is called with the message once it is received, and its result is sent
    /// back to the producer of that message.
    #[cfg_attr(test, tracing::instrument(skip_all, fields(queue = %self.name)))]
    pub fn register_waiter(&self, handler: Option<Handler>) -> Result<Deferred<Message>, MqError> {
        let delivery = Deferred::new();
        let waiter = Waiter { delivery: delivery.clone(), handler };

        let mut state = lock(&self.state);
        if state.closed {
            error!("Tried to receive from a closed queue");
            return Err(MqError::Closed(self.name.clone()));
        }

        match state.pop_live(tokio::time::Instant::now()) {
            Some(Pending { message, reply }) => {
                drop(state);
                debug!(id = %message.id(), "Message ready, delivering it");
                Target::Waiter(waiter).deliver(message, &reply);
            }
            None => {
                state.waiters.push_back(waiter);
                debug!(waiting = state.waiters.len(), "No message ready, registering waiter");
            }
        }

        Ok(delivery)
    }

    /// Takes the oldest buffered message which has not expired, without waiting for one if there
    /// is none.
    #[cfg_attr(test, tracing::instrument(skip_all, fields(queue = %self.name)))]
    pub fn receive_no_wait(&self) -> Result<Option<Message>, MqError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(MqError::Closed(self.name.clone()));
        }

        let pending = state.pop_live(tokio::time::Instant::now());
        drop(state);

        Ok(pending.map(|Pending { message, reply }| {
            debug!(id = %message.id(), "Received message");
            reply.resolve(Reply::Delivered(message.clone()));
            message
        }))
    }

    /// Attaches a listener which handles every message not claimed by a pending waiter. Messages
    /// already buffered are handed to it first, in the order in which they were sent.
    ///
    /// Buffered messages are popped and delivered one at a time, and the listener only starts
    /// taking new messages once the buffer is empty. Messages sent while the buffer is draining
    /// queue up behind it, and receives made meanwhile take buffered messages before the listener.
    #[cfg_attr(test, tracing::instrument(skip_all, fields(queue = %self.name)))]
    pub fn set_listener(&self, listener: Listener) -> Result<(), MqError> {
        loop {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(MqError::Closed(self.name.clone()));
            }

            match state.pop_live(tokio::time::Instant::now()) {
                Some(Pending { message, reply }) => {
                    drop(state);
                    Target::Listener(std::sync::Arc::clone(&listener)).deliver(message, &reply);
                }
                None => {
                    state.listener = Some(listener);
                    info!("Buffer drained, listener attached");
                    return Ok(());
                }
            }
        }
    }

    /// Detaches the current listener, if any. Messages sent afterwards are buffered again.
    pub fn clear_listener(&self) -> Option<Listener> {
        lock(&self.state).listener.take()
    }

    /// Closes the queue. Buffered messages and pending waiters are rejected with
    /// [`MqError::Closed`], and any further send or receive fails. Closing an already closed queue
    /// does nothing.
    #[cfg_attr(test, tracing::instrument(skip_all, fields(queue = %self.name)))]
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if state.closed {
            debug!("Queue already closed");
            return;
        }

        state.closed = true;
        state.listener = None;
        let messages = std::mem::take(&mut state.messages);
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);

        warn!(messages = messages.len(), waiters = waiters.len(), "Closing queue");

        for Pending { reply, .. } in messages {
            reply.reject(MqError::Closed(self.name.clone()));
        }
        for Waiter { delivery, .. } in waiters {
            delivery.reject(MqError::Closed(self.name.clone()));
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Number of buffered messages, expired or not.
    pub fn pending_messages(&self) -> usize {
        lock(&self.state).messages.len()
    }

    /// Number of `receive` calls still waiting on a message.
    pub fn pending_waiters(&self) -> usize {
        lock(&self.state).waiters.len()
    }
}

impl QueueState {
    fn next_target(&mut self) -> Option<Target> {
        self.waiters.pop_front().map(Target::Waiter).or_else(|| self.listener.clone().map(Target::Listener))
    }

    /// Pops the oldest message which has not expired by `now`, dropping every expired message
    /// found in front of it.
    fn pop_live(&mut self, now: tokio::time::Instant) -> Option<Pending> {
        while let Some(pending) = self.messages.pop_front() {
            if !pending.message.is_expired_at(now) {
                return Some(pending);
            }
            debug!(id = %pending.message.id(), "Dropping expired message");
        }
        None
    }
}

impl Target {
    /// Hands `message` to this consumer and settles `reply` with the outcome of its handler.
    #[cfg_attr(test, tracing::instrument(skip_all, fields(id = %message.id())))]
    pub(crate) fn deliver(self, message: Message, reply: &Deferred<Reply>) {
        let outcome = match self {
            Self::Waiter(Waiter { delivery, handler }) => {
                delivery.resolve(message.clone());
                match handler {
                    Some(handler) => run(|| handler(&message)),
                    None => Ok(None),
                }
            }
            Self::Listener(listener) => run(|| listener(&message)),
        };

        match outcome {
            Ok(Some(response)) => {
                debug!("Message handled with a response");
                reply.resolve(Reply::Response(response));
            }
            Ok(None) => {
                debug!("Message handled");
                reply.resolve(Reply::Delivered(message));
            }
            Err(err) => {
                warn!(%err, "Consumer failed to handle message");
                reply.reject(MqError::Handler(err));
            }
        }
    }
}

fn run(handler: impl FnOnce() -> HandlerResult) -> HandlerResult {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(handler))
        .unwrap_or_else(|payload| Err(HandlerError::panicked(payload)))
}
