//! `rust-jms` is an in-process, JMS-style messaging facade: producers and consumers exchange
//! messages through named destinations without ever holding a reference to each other. Everything
//! lives in memory for the lifetime of the process, so that application code can be written against
//! an abstract messaging interface and later be moved to a real broker.
//!
//! # Usage
//!
//! A [`Connection`] is a registry of destinations. Each [`Queue`] declared on it comes with a
//! single [`MessageProducer`] and a single [`MessageConsumer`] (point-to-point semantics):
//!
//! 1. Sending a message to a queue hands it straight to the oldest pending receive if there is one,
//!    or buffers it otherwise.
//!
//! 2. Receiving from a queue takes the oldest buffered message if there is one, or waits for the
//!    next one otherwise.
//!
//! 3. Messages are received in the order in which they were sent, and pending receives are served
//!    in the order in which they were made.
//!
//! 4. Sending returns a [`Deferred`] which settles once a consumer has handled the message. If the
//!    consumer attached a handler to its receive, the sender gets back whatever that handler
//!    returns, or its error. This lets a queue be used as a request/response channel.
//!
//! 5. Messages can be given a time-to-live, past which they will never be delivered.
//!
//! The following uses a queue as a simple echo service:
//!
//! ```rust
//! use rust_jms::{Connection, HandlerResult, Message, Reply};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rust_jms::MqError> {
//!     let connection = Connection::new();
//!     connection.create_queue("/echo")?;
//!
//!     // Nobody is listening yet, so this is buffered.
//!     let reply = connection.send("/echo", Some(serde_json::json!({ "say": "hello" })), None)?;
//!
//!     let received = connection.receive_with(
//!         "/echo",
//!         Box::new(|message: &Message| -> HandlerResult { Ok(Some(message.body().clone())) }),
//!     )?;
//!
//!     assert_eq!(received.await?.body()["say"], "hello");
//!     assert_eq!(reply.await?, Reply::Response(serde_json::json!({ "say": "hello" })));
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Known scenarios are covered by unit tests next to the code they exercise. On top of this:
//!
//! - [`loom`] is used to explore the concurrent interleavings of sends, receives and closes on a
//!   single queue. Loom tests only run with the `loom` feature, and only the `race_*` tests should
//!   be run with it enabled since every other test uses the queue outside of a loom model:
//!
//!   ```bash
//!   cargo test race_ --release --features loom
//!   ```
//!
//! - [`proptest`] checks the queue against a reference model of its two buffers under thousands of
//!   random sequences of sends and receives:
//!
//!   ```bash
//!   cargo test queue_proptest --release --features proptest
//!   ```
//!
//! Logs are only emitted in tests, or with the `trace` feature enabled. Use `RUST_LOG=debug` to see
//! every matching decision.
//!
//! # Known limitations
//!
//! ## Expiration is lazy
//!
//! A message is only checked for expiration when a receive reaches it. Expired messages which are
//! never reached stay in memory until their queue is closed.
//!
//! ## Waiters cannot be cancelled
//!
//! There is no way to take back a receive once it is waiting: it stays registered until a message
//! arrives or the queue is closed.
//!
//! ## Point-to-point only
//!
//! There is no support for topics or for several competing consumers on the same queue within a
//! connection.

mod config;
mod connection;
mod deferred;
mod endpoint;
mod errors;
mod macros;
mod message;
mod queue;
mod sync;

#[cfg(test)]
mod common;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use deferred::{Deferred, Outcome, State, TBound};
pub use endpoint::{Delivery, MessageConsumer, MessageProducer, QueueReceiver, QueueSender};
pub use errors::{HandlerError, MqError};
pub use message::{Message, MessageBuilder, MessageId, Reply};
pub use queue::{Handler, HandlerResult, Listener, Queue};
