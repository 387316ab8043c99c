use std::time::Duration;

use redis::Client;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};

/// Connect to the subscriber store and verify it answers `PING`.
///
/// Timeouts are bounded so a dead Redis cannot stall a dispatch pass forever;
/// the directory treats the resulting error as "no recipients this pass".
pub async fn create_redis_pool(
    redis_url: &str,
    request_timeout: Duration,
) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let config = ConnectionManagerConfig::new()
        .set_connection_timeout(request_timeout)
        .set_response_timeout(request_timeout);
    let mut manager = ConnectionManager::new_with_config(client, config).await?;

    let _: String = redis::cmd("PING").query_async(&mut manager).await?;

    tracing::info!("Connected to Redis subscriber store");
    Ok(manager)
}
