//! Hammers one endpoint and shows retries and the breaker at work.
//!
//! ```sh
//! RUST_LOG=cutline=debug,cutline_resilience=debug \
//!     cargo run -p cutline --example retry_circuit -- https://httpbin.org status/503
//! ```

use cutline::{CircuitBreakerConfig, Cutline, CutlineConfig, RetryConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cutline=debug,cutline_resilience=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let base_url = args.next().unwrap_or_else(|| "https://httpbin.org".to_string());
    let path = args.next().unwrap_or_else(|| "status/503".to_string());

    let config = CutlineConfig::new()
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(5))
        .with_retry(
            RetryConfig::new()
                .with_max_retries(2)
                .with_retry_delay(Duration::from_millis(200)),
        )
        .with_circuit_breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_recovery_timeout(Duration::from_secs(2)),
        );

    let client = Cutline::new(config)?;

    for round in 1..=6 {
        match client.get(&path).await {
            Ok(response) => tracing::info!(round, status = response.status(), "Request succeeded"),
            Err(err) => tracing::info!(round, error = %err, "Request failed"),
        }
        tracing::info!(
            round,
            state = %client.circuit_breaker_state(),
            failures = client.failure_count(),
            "Breaker status"
        );

        if round == 4 {
            tracing::info!("Waiting out the recovery timeout");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    Ok(())
}
