use crate::errors::MqError;

/// Unique identifier attached to every [`Message`] on creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(uuid::Uuid);

impl MessageId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ID:{}", self.0)
    }
}

/// An immutable message addressed to a named destination.
///
/// Messages are created with a [`MessageBuilder`]. A message without a body carries an empty json
/// object, and a message without a time-to-live never expires.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    id: MessageId,
    destination: String,
    body: serde_json::Value,
    correlation_id: Option<String>,
    timestamp: tokio::time::Instant,
    expiration: Option<tokio::time::Instant>,
}

/// What a producer gets back once the message it sent has been handled by a consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The consumer's handler produced a response.
    Response(serde_json::Value),
    /// The message was handled without an explicit response.
    Delivered(Message),
}

#[must_use]
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    destination: String,
    body: Option<serde_json::Value>,
    correlation_id: Option<String>,
    time_to_live: Option<std::time::Duration>,
    expires_at: Option<tokio::time::Instant>,
}

impl Message {
    pub fn builder(destination: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            destination: destination.into(),
            body: None,
            correlation_id: None,
            time_to_live: None,
            expires_at: None,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    pub fn into_body(self) -> serde_json::Value {
        self.body
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// The instant at which the message was created.
    pub fn timestamp(&self) -> tokio::time::Instant {
        self.timestamp
    }

    /// The instant from which the message can no longer be delivered, if any.
    pub fn expiration(&self) -> Option<tokio::time::Instant> {
        self.expiration
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(tokio::time::Instant::now())
    }

    pub fn is_expired_at(&self, now: tokio::time::Instant) -> bool {
        self.expiration.is_some_and(|expiration| now >= expiration)
    }
}

impl Reply {
    /// The response body, or the body of the delivered message if the consumer did not respond.
    pub fn body(&self) -> &serde_json::Value {
        match self {
            Self::Response(body) => body,
            Self::Delivered(message) => message.body(),
        }
    }
}

impl MessageBuilder {
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Expires the message `time_to_live` after it is built. Ignored if [`expires_at`] is set.
    ///
    /// [`expires_at`]: Self::expires_at
    pub fn time_to_live(mut self, time_to_live: std::time::Duration) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    pub fn expires_at(mut self, expires_at: tokio::time::Instant) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn build(self) -> Result<Message, MqError> {
        if self.destination.is_empty() {
            return Err(MqError::EmptyName);
        }

        let timestamp = tokio::time::Instant::now();
        // A time-to-live too large to be represented is as good as none at all
        let expiration = self.expires_at.or_else(|| self.time_to_live.and_then(|ttl| timestamp.checked_add(ttl)));

        Ok(Message {
            id: MessageId::new(),
            destination: self.destination,
            body: self.body.unwrap_or_else(|| serde_json::json!({})),
            correlation_id: self.correlation_id,
            timestamp,
            expiration,
        })
    }
}
