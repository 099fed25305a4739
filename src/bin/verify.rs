//! Smoke-tests a running deployment over HTTP.
//!
//! Usage: `filetrack-verify <base-url>` (or set `APP_URL`).

use anyhow::{bail, Context, Result};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

const LATENCY_SAMPLES: u32 = 5;

struct Check {
    name: &'static str,
    passed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .without_time()
        .init();

    let base_url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("APP_URL").ok())
        .context("usage: filetrack-verify <base-url>")?;
    let base_url = base_url.trim_end_matches('/').to_string();

    let client = Client::builder()
        .redirect(Policy::none())
        .timeout(Duration::from_secs(30))
        .build()?;

    info!("Verifying deployment at {}", base_url);
    let checks = vec![
        Check { name: "health endpoint", passed: check_health(&client, &base_url).await },
        Check { name: "login page", passed: check_login_page(&client, &base_url).await },
        Check { name: "home requires login", passed: check_gated(&client, &base_url, "/").await },
        Check {
            name: "search API requires login",
            passed: check_gated(&client, &base_url, "/api/search?q=x").await,
        },
        Check { name: "export requires login", passed: check_gated(&client, &base_url, "/export").await },
        Check { name: "health latency", passed: check_latency(&client, &base_url).await },
    ];

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).map(|c| c.name).collect();
    info!("{}/{} checks passed", checks.len() - failed.len(), checks.len());
    if !failed.is_empty() {
        bail!("failed checks: {}", failed.join(", "));
    }
    Ok(())
}

async fn check_health(client: &Client, base_url: &str) -> bool {
    let response = match client.get(format!("{base_url}/health")).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("health check request failed: {}", e);
            return false;
        }
    };

    let status = response.status();
    let body: Value = response.json().await.unwrap_or_default();
    let healthy = status == StatusCode::OK && body["status"] == "healthy";
    if healthy {
        info!(
            "health check passed (database: {}, platform: {})",
            body["database"], body["platform"]
        );
    } else {
        error!("health check failed with status {}: {}", status, body);
    }
    healthy
}

async fn check_login_page(client: &Client, base_url: &str) -> bool {
    match client.get(format!("{base_url}/login")).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            let text = response.text().await.unwrap_or_default().to_lowercase();
            if !text.contains("password") {
                error!("login page loaded but no form was found");
                return false;
            }
            info!("login page loads");
            true
        }
        Ok(response) => {
            error!("login page returned {}", response.status());
            false
        }
        Err(e) => {
            error!("login page request failed: {}", e);
            false
        }
    }
}

async fn check_gated(client: &Client, base_url: &str, path: &str) -> bool {
    match client.get(format!("{base_url}{path}")).send().await {
        Ok(response) => {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let redirected = response.status() == StatusCode::FOUND && location.ends_with("/login");
            if redirected {
                info!("{} redirects anonymous users to /login", path);
            } else {
                error!("{} returned {} (location {:?})", path, response.status(), location);
            }
            redirected
        }
        Err(e) => {
            error!("{} request failed: {}", path, e);
            false
        }
    }
}

/// Times repeated health calls; slow responses warn, failed ones fail the check.
async fn check_latency(client: &Client, base_url: &str) -> bool {
    let mut timings = Vec::new();
    for attempt in 1..=LATENCY_SAMPLES {
        let started = Instant::now();
        match client.get(format!("{base_url}/health")).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                let elapsed = started.elapsed();
                info!("request {}: {}ms", attempt, elapsed.as_millis());
                timings.push(elapsed);
            }
            Ok(response) => {
                error!("request {}: status {}", attempt, response.status());
                return false;
            }
            Err(e) => {
                error!("request {} failed: {}", attempt, e);
                return false;
            }
        }
        sleep(Duration::from_millis(500)).await;
    }

    let (average, min, max) = latency_summary(&timings);
    info!(
        "latency average {}ms (min {}ms, max {}ms)",
        average.as_millis(),
        min.as_millis(),
        max.as_millis()
    );
    if average >= Duration::from_secs(2) {
        warn!("slow responses; check the database connection");
    }
    true
}

/// Average, minimum and maximum of the recorded timings.
fn latency_summary(timings: &[Duration]) -> (Duration, Duration, Duration) {
    let total: Duration = timings.iter().sum();
    let average = match u32::try_from(timings.len()) {
        Ok(0) | Err(_) => Duration::ZERO,
        Ok(n) => total / n,
    };
    let min = timings.iter().min().copied().unwrap_or_default();
    let max = timings.iter().max().copied().unwrap_or_default();
    (average, min, max)
}
