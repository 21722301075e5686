use crate::config::ConnectionConfig;
use crate::deferred::Deferred;
use crate::endpoint::{MessageConsumer, MessageProducer, QueueReceiver, QueueSender};
use crate::errors::MqError;
use crate::macros::*;
use crate::message::{Message, Reply};
use crate::queue::{Handler, Queue};

/// An in-process connection to a set of named destinations.
///
/// Each connection owns its own registry, so destinations declared on one connection are invisible
/// to every other one. A destination has exactly one [`MessageProducer`] and one
/// [`MessageConsumer`] per connection: asking for either twice returns the same instance.
///
/// Dropping a connection [closes] it.
///
/// [closes]: Self::close
pub struct Connection {
    config: ConnectionConfig,
    registry: std::sync::Arc<Registry>,
}

/// Maps each destination name to its queue and endpoints.
#[derive(Default)]
pub(crate) struct Registry {
    destinations: dashmap::DashMap<String, Endpoints>,
    closed: std::sync::atomic::AtomicBool,
}

#[derive(Clone)]
struct Endpoints {
    queue: std::sync::Arc<Queue>,
    producer: std::sync::Arc<dyn MessageProducer>,
    consumer: std::sync::Arc<dyn MessageConsumer>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("destinations", &self.destinations())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Registry {
    fn endpoints(&self, name: &str) -> Result<Endpoints, MqError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(MqError::ConnectionClosed);
        }
        self.destinations.get(name).map(|entry| entry.value().clone()).ok_or_else(|| MqError::Undeclared(name.to_string()))
    }

    /// Looks up the queue and consumer a message sent to `name` should go to.
    pub(crate) fn route(
        &self,
        name: &str,
    ) -> Result<(std::sync::Arc<Queue>, std::sync::Arc<dyn MessageConsumer>), MqError> {
        self.endpoints(name).map(|Endpoints { queue, consumer, .. }| (queue, consumer))
    }
}

impl Connection {
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        debug!(client = ?config.client_id, "Opening connection");
        Self { config, registry: std::sync::Arc::default() }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Declares a queue named `name`, backed by an in-process [`QueueReceiver`]. Declaring the same
    /// name again returns the existing queue.
    pub fn create_queue(&self, name: &str) -> Result<std::sync::Arc<Queue>, MqError> {
        self.create_queue_with(name, |queue| std::sync::Arc::new(QueueReceiver::new(queue)))
    }

    /// Declares a queue named `name` whose consumer is built by `consumer`. This allows swapping
    /// in another [`MessageConsumer`] implementation, such as a test double. Declaring the same
    /// name again returns the existing queue and does not call `consumer`.
    ///
    /// `consumer` runs while the registry entry for `name` is locked and must not call back into
    /// this connection.
    #[cfg_attr(test, tracing::instrument(skip(self, consumer), fields(client = ?self.config.client_id)))]
    pub fn create_queue_with<F>(&self, name: &str, consumer: F) -> Result<std::sync::Arc<Queue>, MqError>
    where
        F: FnOnce(std::sync::Arc<Queue>) -> std::sync::Arc<dyn MessageConsumer>,
    {
        if name.is_empty() {
            return Err(MqError::EmptyName);
        }
        if self.is_closed() {
            error!("Tried to declare a queue on a closed connection");
            return Err(MqError::ConnectionClosed);
        }

        let queue = {
            let entry = self.registry.destinations.entry(name.to_string()).or_insert_with(|| {
                info!("Declaring queue");
                let queue = std::sync::Arc::new(Queue::new(name));
                let consumer = consumer(std::sync::Arc::clone(&queue));
                let producer = std::sync::Arc::new(QueueSender::new(
                    name,
                    std::sync::Arc::downgrade(&self.registry),
                    self.config.time_to_live(),
                ));
                Endpoints { queue, producer, consumer }
            });
            std::sync::Arc::clone(&entry.queue)
        };

        // A concurrent `close` may have emptied the registry before the insert above
        if self.is_closed() {
            self.registry.destinations.remove(name);
            queue.close();
            return Err(MqError::ConnectionClosed);
        }

        Ok(queue)
    }

    pub fn queue(&self, name: &str) -> Result<std::sync::Arc<Queue>, MqError> {
        self.registry.endpoints(name).map(|endpoints| endpoints.queue)
    }

    pub fn producer(&self, name: &str) -> Result<std::sync::Arc<dyn MessageProducer>, MqError> {
        self.registry.endpoints(name).map(|endpoints| endpoints.producer)
    }

    pub fn consumer(&self, name: &str) -> Result<std::sync::Arc<dyn MessageConsumer>, MqError> {
        self.registry.endpoints(name).map(|endpoints| endpoints.consumer)
    }

    /// Sends a message with `body` (an empty json object if `None`) to the queue `name`. See
    /// [`MessageProducer::send_body`].
    pub fn send(
        &self,
        name: &str,
        body: Option<serde_json::Value>,
        time_to_live: Option<std::time::Duration>,
    ) -> Result<Deferred<Reply>, MqError> {
        self.producer(name)?.send_body(body, time_to_live)
    }

    /// Receives the next message sent to the queue `name`. See [`MessageConsumer::receive`].
    pub fn receive(&self, name: &str) -> Result<Deferred<Message>, MqError> {
        self.consumer(name)?.receive()
    }

    /// See [`MessageConsumer::receive_with`].
    pub fn receive_with(&self, name: &str, handler: Handler) -> Result<Deferred<Message>, MqError> {
        self.consumer(name)?.receive_with(handler)
    }

    /// Names of every declared destination, in lexicographic order.
    pub fn destinations(&self) -> Vec<String> {
        let mut names = self.registry.destinations.iter().map(|entry| entry.key().clone()).collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Closes every destination and forgets about them. Calling this more than once does nothing.
    #[cfg_attr(test, tracing::instrument(skip(self), fields(client = ?self.config.client_id)))]
    pub fn close(&self) {
        if self.registry.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return;
        }

        let queues =
            self.registry.destinations.iter().map(|entry| std::sync::Arc::clone(&entry.queue)).collect::<Vec<_>>();
        self.registry.destinations.clear();

        warn!(queues = queues.len(), "Closing connection");
        for queue in queues {
            queue.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(std::sync::atomic::Ordering::Acquire)
    }
}
