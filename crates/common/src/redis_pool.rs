use redis::Client;
use redis::aio::ConnectionManager;

/// Open a reconnecting Redis connection for the processing record store.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client.clone()).await?;

    tracing::info!(redis_addr = %redis_addr(&client), "Connected to Redis");
    Ok(manager)
}

/// Host and port only; the URL may carry credentials.
fn redis_addr(client: &Client) -> String {
    client.get_connection_info().addr.to_string()
}
