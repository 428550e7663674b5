use std::future::Future;
use std::time::Duration;

use anyhow::Result;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn within<T>(description: &str, fut: impl Future<Output = T>) -> Result<T> {
    match tokio::time::timeout(STEP_TIMEOUT, fut).await {
        Ok(value) => Ok(value),
        Err(_) => anyhow::bail!("timeout waiting for {description}"),
    }
}
