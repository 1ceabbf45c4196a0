//! Application health probing before a run

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Poll `{base_url}/health` until it answers 2xx or `timeout` elapses
pub async fn wait_for_healthy(base_url: &str, timeout: Duration, interval: Duration) -> HarnessResult<()> {
    let health_url = format!("{}/health", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Application is healthy at {}", base_url);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Health check returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to become healthy...", base_url);
                }
                // Connection refused is expected while the application starts
                if !e.is_connect() {
                    warn!("Health check error: {}", e);
                }
            }
        }

        if start.elapsed() >= timeout {
            return Err(HarnessError::ServerHealthCheck(attempts));
        }
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthy_application() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"UP"}"#)
            .create_async()
            .await;

        wait_for_healthy(&format!("{}/", server.url()), Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unhealthy_application_reports_attempts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(503)
            .expect_at_least(2)
            .create_async()
            .await;

        let err = wait_for_healthy(&server.url(), Duration::from_millis(200), Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            HarnessError::ServerHealthCheck(attempts) => assert!(attempts >= 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
