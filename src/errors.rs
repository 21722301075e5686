/// Everything that can go wrong when talking to a [`Connection`] or one of its destinations.
///
/// Errors are [`Clone`] since a single [`Deferred`] can be awaited from many places at once, and
/// all of them must observe the same outcome.
///
/// [`Connection`]: crate::Connection
/// [`Deferred`]: crate::Deferred
#[derive(thiserror::Error, Clone, Debug)]
pub enum MqError {
    #[error("Destination {0:?} has not been declared on this connection")]
    Undeclared(String),
    #[error("Destination {0:?} is closed")]
    Closed(String),
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Destination names cannot be empty")]
    EmptyName,
    #[error("Message addressed to {message:?} was sent through the producer of {producer:?}")]
    Misrouted { message: String, producer: String },
    #[error("Consumer failed to handle message: {0}")]
    Handler(#[from] HandlerError),
    #[error("Deferred result was dropped before being settled")]
    Abandoned,
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// An error raised by application code while handling a delivered message. This is sent back to
/// the producer of that message as a rejection of its [`Deferred`].
///
/// [`Deferred`]: crate::Deferred
#[derive(Clone, Debug)]
pub struct HandlerError(std::sync::Arc<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(std::sync::Arc::from(err.into()))
    }

    pub(crate) fn panicked(payload: Box<dyn std::any::Any + Send>) -> Self {
        let reason = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new(format!("handler panicked: {reason}"))
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<&str> for HandlerError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for HandlerError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handler_error_display() {
        let err = MqError::from(HandlerError::from("boom"));
        assert_eq!(err.to_string(), "Consumer failed to handle message: boom");
        assert_matches::assert_matches!(err, MqError::Handler(e) => assert_eq!(e.to_string(), "boom"));
    }

    #[test]
    fn handler_error_panic_payload() {
        let payload = std::panic::catch_unwind(|| panic!("kaboom")).unwrap_err();
        assert_eq!(HandlerError::panicked(payload).to_string(), "handler panicked: kaboom");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(HandlerError::panicked(payload).to_string(), "handler panicked: unknown panic payload");
    }
}
