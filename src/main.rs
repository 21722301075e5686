use rust_jms::{Connection, HandlerResult, Message, MqError};

#[tokio::main]
async fn main() -> Result<(), MqError> {
    let connection = Connection::new();
    connection.create_queue("/jobs")?;

    // Sends and receives can happen in any order, messages are matched in FIFO order either way.
    let replies = (0..3)
        .map(|i| connection.send("/jobs", Some(serde_json::json!({ "job": i })), None))
        .collect::<Result<Vec<_>, _>>()?;

    for i in 0..3 {
        let handler = Box::new(|message: &Message| -> HandlerResult {
            let job = message.body()["job"].as_u64().ok_or("job is not a number")?;
            Ok(Some(serde_json::json!({ "done": job })))
        });
        let message = connection.receive_with("/jobs", handler)?.await?;
        assert_eq!(message.body()["job"], i);
    }

    // Producers hear back from the consumer's handler.
    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.await?.body()["done"], i);
    }

    connection.close();
    Ok(())
}
