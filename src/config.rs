use crate::errors::MqError;

/// Settings shared by every destination of a [`Connection`].
///
/// ```toml
/// client_id = "billing"
/// time_to_live_ms = 30000
/// ```
///
/// [`Connection`]: crate::Connection
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Identifies the connection in logs.
    pub client_id: Option<String>,
    /// Default time-to-live, in milliseconds, of messages sent without one. Messages never expire
    /// if this is not set.
    pub time_to_live_ms: Option<u64>,
}

impl ConnectionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, MqError> {
        toml::from_str(s).map_err(|e| MqError::Config(e.to_string()))
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_time_to_live(mut self, time_to_live: std::time::Duration) -> Self {
        self.time_to_live_ms = Some(u64::try_from(time_to_live.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn time_to_live(&self) -> Option<std::time::Duration> {
        self.time_to_live_ms.map(std::time::Duration::from_millis)
    }
}
