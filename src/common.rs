//! Shared test fixtures.

pub(crate) type LogConfig = tracing_subscriber::fmt::SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Full, ()>,
    tracing_subscriber::EnvFilter,
>;

#[rstest::fixture]
pub(crate) fn log_conf() -> LogConfig {
    let env = tracing_subscriber::EnvFilter::from_default_env();
    tracing_subscriber::fmt::Subscriber::builder().with_env_filter(env).without_time()
}

#[rstest::fixture]
pub(crate) fn log_stdout(log_conf: LogConfig) {
    let _ = log_conf.with_test_writer().try_init();
}

#[cfg(feature = "loom")]
#[rstest::fixture]
pub(crate) fn model(#[default("loomtest")] path: &str, #[allow(unused)] log_stdout: ()) -> loom::model::Builder {
    let mut model = loom::model::Builder::new();
    model.checkpoint_interval = 1;
    model.checkpoint_file = Some(std::path::PathBuf::from(format!("{path}.json")));
    model.location = true;
    model
}

/// A connection with a single queue named `/q` already declared on it.
#[rstest::fixture]
pub(crate) fn connection(#[allow(unused)] log_stdout: ()) -> crate::Connection {
    let connection = crate::Connection::new();
    connection.create_queue("/q").expect("Failed to declare test queue");
    connection
}

/// Builds a message to `/q` whose body is `{ "test": "<n>" }`.
pub(crate) fn numbered(n: impl std::fmt::Display) -> crate::Message {
    crate::Message::builder("/q")
        .body(serde_json::json!({ "test": n.to_string() }))
        .build()
        .expect("Failed to build test message")
}

/// Reads back the `n` of a message built with [`numbered`].
pub(crate) fn number_of(message: &crate::Message) -> String {
    message.body()["test"].as_str().map(ToString::to_string).unwrap_or_default()
}
