use crate::connection::Registry;
use crate::deferred::Deferred;
use crate::errors::MqError;
use crate::macros::*;
use crate::message::{Message, Reply};
use crate::queue::{Handler, Listener, Queue};

/// Whether a consumer took a message offered to it through [`MessageConsumer::on_message`].
#[derive(Debug)]
pub enum Delivery {
    /// The message was handed to a consumer handler, which settled the producer's [`Deferred`].
    Handled,
    /// Nobody was ready to take the message. It is handed back so that it can be buffered.
    Unhandled(Message),
}

impl Delivery {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// The sending half of a destination.
pub trait MessageProducer: Send + Sync {
    fn destination(&self) -> &str;

    /// Time-to-live applied to messages built by [`send_body`] when none is given.
    ///
    /// [`send_body`]: Self::send_body
    fn time_to_live(&self) -> Option<std::time::Duration> {
        None
    }

    /// Sends `message`, returning a [`Deferred`] which settles with whatever the consumer's handler
    /// makes of it. If a consumer is already waiting, its handler runs before this returns.
    fn send(&self, message: Message) -> Result<Deferred<Reply>, MqError>;

    /// Builds a message to this producer's destination and sends it. Messages without a `body`
    /// carry an empty json object.
    fn send_body(
        &self,
        body: Option<serde_json::Value>,
        time_to_live: Option<std::time::Duration>,
    ) -> Result<Deferred<Reply>, MqError> {
        let mut builder = Message::builder(self.destination());
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(time_to_live) = time_to_live.or_else(|| self.time_to_live()) {
            builder = builder.time_to_live(time_to_live);
        }
        self.send(builder.build()?)
    }
}

/// The receiving half of a destination.
pub trait MessageConsumer: Send + Sync {
    fn destination(&self) -> &str;

    /// Returns a [`Deferred`] which resolves to the next message sent to this destination.
    fn receive(&self) -> Result<Deferred<Message>, MqError>;

    /// Like [`receive`], calling `handler` with the message once it arrives. The handler's result
    /// is sent back to the producer of that message.
    ///
    /// [`receive`]: Self::receive
    fn receive_with(&self, handler: Handler) -> Result<Deferred<Message>, MqError>;

    /// Returns the next message if one is already available, without waiting.
    fn receive_no_wait(&self) -> Result<Option<Message>, MqError>;

    /// Attaches a listener called for every message not claimed by a pending receive.
    fn set_listener(&self, listener: Listener) -> Result<(), MqError>;

    fn clear_listener(&self);

    /// Delivery hook. Offers `message` to whoever is ready to take it right now and settles `reply`
    /// with the outcome of its handler, or hands the message back if nobody is ready.
    fn on_message(&self, message: Message, reply: &Deferred<Reply>) -> Delivery;
}

/// In-process [`MessageProducer`]: finds the consumer of its destination through the connection
/// registry on every send and offers it the message, buffering it on the queue if it is not taken.
pub struct QueueSender {
    destination: String,
    registry: std::sync::Weak<Registry>,
    time_to_live: Option<std::time::Duration>,
}

/// In-process [`MessageConsumer`] reading from a single [`Queue`].
pub struct QueueReceiver {
    queue: std::sync::Arc<Queue>,
}

impl std::fmt::Debug for QueueSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSender")
            .field("destination", &self.destination)
            .field("time_to_live", &self.time_to_live)
            .finish()
    }
}

impl std::fmt::Debug for QueueReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReceiver").field("queue", &self.queue).finish()
    }
}

impl QueueSender {
    pub(crate) fn new(
        destination: impl Into<String>,
        registry: std::sync::Weak<Registry>,
        time_to_live: Option<std::time::Duration>,
    ) -> Self {
        Self { destination: destination.into(), registry, time_to_live }
    }
}

impl MessageProducer for QueueSender {
    fn destination(&self) -> &str {
        &self.destination
    }

    fn time_to_live(&self) -> Option<std::time::Duration> {
        self.time_to_live
    }

    #[cfg_attr(test, tracing::instrument(skip_all, fields(destination = %self.destination, id = %message.id())))]
    fn send(&self, message: Message) -> Result<Deferred<Reply>, MqError> {
        if message.destination() != self.destination {
            error!(to = message.destination(), "Message is addressed to another destination");
            return Err(MqError::Misrouted {
                message: message.destination().to_string(),
                producer: self.destination.clone(),
            });
        }

        let (queue, consumer) = {
            let registry = self.registry.upgrade().ok_or(MqError::ConnectionClosed)?;
            registry.route(&self.destination)?
        };

        let reply = Deferred::new();
        match consumer.on_message(message, &reply) {
            Delivery::Handled => {
                debug!("Message dispatched directly to a waiting consumer");
            }
            Delivery::Unhandled(message) => queue.enqueue(message, reply.clone())?,
        }

        Ok(reply)
    }
}

impl QueueReceiver {
    pub fn new(queue: std::sync::Arc<Queue>) -> Self {
        Self { queue }
    }
}

impl MessageConsumer for QueueReceiver {
    fn destination(&self) -> &str {
        self.queue.name()
    }

    fn receive(&self) -> Result<Deferred<Message>, MqError> {
        self.queue.register_waiter(None)
    }

    fn receive_with(&self, handler: Handler) -> Result<Deferred<Message>, MqError> {
        self.queue.register_waiter(Some(handler))
    }

    fn receive_no_wait(&self) -> Result<Option<Message>, MqError> {
        self.queue.receive_no_wait()
    }

    fn set_listener(&self, listener: Listener) -> Result<(), MqError> {
        self.queue.set_listener(listener)
    }

    fn clear_listener(&self) {
        self.queue.clear_listener();
    }

    fn on_message(&self, message: Message, reply: &Deferred<Reply>) -> Delivery {
        match self.queue.take_target() {
            Some(target) => {
                target.deliver(message, reply);
                Delivery::Handled
            }
            None => {
                trace!("No consumer ready");
                Delivery::Unhandled(message)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::*;
    use crate::deferred::State;
    use crate::queue::HandlerResult;

    #[rstest::rstest]
    fn direct_dispatch(connection: crate::Connection) {
        let consumer = connection.consumer("/q").unwrap();
        let producer = connection.producer("/q").unwrap();
        let queue = connection.queue("/q").unwrap();

        let delivery = consumer.receive().unwrap();
        let reply = producer.send(numbered(1)).unwrap();

        // Delivered before `send` returned, without ever touching the buffer
        assert_eq!(reply.state(), State::Resolved);
        assert_matches::assert_matches!(delivery.peek(), Some(Ok(m)) => assert_eq!(number_of(&m), "1"));
        assert_eq!(queue.pending_messages(), 0);
        assert_eq!(queue.pending_waiters(), 0);
    }

    #[rstest::rstest]
    fn unhandled_is_buffered(connection: crate::Connection) {
        let consumer = connection.consumer("/q").unwrap();
        let producer = connection.producer("/q").unwrap();

        let reply = Deferred::new();
        assert_matches::assert_matches!(consumer.on_message(numbered(1), &reply), Delivery::Unhandled(m) => {
            assert_eq!(number_of(&m), "1")
        });
        assert!(reply.is_pending());

        let reply = producer.send(numbered(2)).unwrap();
        assert!(reply.is_pending());
        assert_eq!(connection.queue("/q").unwrap().pending_messages(), 1);
    }

    #[rstest::rstest]
    fn on_message_runs_handler(connection: crate::Connection) {
        let consumer = connection.consumer("/q").unwrap();
        consumer
            .receive_with(Box::new(|_: &Message| -> HandlerResult { Ok(Some(serde_json::json!("pong"))) }))
            .unwrap();

        let reply = Deferred::new();
        let delivery = consumer.on_message(numbered(1), &reply);

        assert!(delivery.is_handled());
        assert_matches::assert_matches!(reply.peek(), Some(Ok(Reply::Response(body))) => assert_eq!(body, "pong"));
    }

    #[rstest::rstest]
    fn send_body_defaults(connection: crate::Connection) {
        let producer = connection.producer("/q").unwrap();
        let consumer = connection.consumer("/q").unwrap();

        producer.send_body(None, None).unwrap();
        assert_matches::assert_matches!(consumer.receive_no_wait(), Ok(Some(m)) => {
            assert_eq!(m.body(), &serde_json::json!({}));
            assert_eq!(m.destination(), "/q");
            assert_eq!(m.expiration(), None);
        });
    }

    #[rstest::rstest]
    fn misrouted(connection: crate::Connection) {
        let producer = connection.producer("/q").unwrap();
        let message = Message::builder("/elsewhere").build().unwrap();

        assert_matches::assert_matches!(producer.send(message), Err(MqError::Misrouted { message, producer }) => {
            assert_eq!(message, "/elsewhere");
            assert_eq!(producer, "/q");
        });
    }

    #[rstest::rstest]
    fn outlives_connection(#[allow(unused)] log_stdout: ()) {
        let connection = crate::Connection::new();
        connection.create_queue("/q").unwrap();
        let producer = connection.producer("/q").unwrap();
        drop(connection);

        assert_matches::assert_matches!(producer.send(numbered(1)), Err(MqError::ConnectionClosed));
    }
}
