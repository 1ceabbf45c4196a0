//! Run reporters
//!
//! Reporters observe verdicts; they never change them. Delivery problems are
//! logged and dropped.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SauceLabsConfig;
use crate::error::HarnessError;

#[async_trait]
pub trait RunReporter: Send + Sync {
    async fn on_scenario_passed(&self, scenario: &str, session_id: &str);

    async fn on_scenario_failed(&self, scenario: &str, session_id: &str, error: &HarnessError);
}

/// Attempt-level log lines only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl RunReporter for LogReporter {
    async fn on_scenario_passed(&self, scenario: &str, session_id: &str) {
        debug!("[{}] attempt passed: {}", session_id, scenario);
    }

    async fn on_scenario_failed(&self, scenario: &str, session_id: &str, error: &HarnessError) {
        info!("[{}] attempt failed: {} ({}: {})", session_id, scenario, error.kind(), error);
    }
}

/// Marks Sauce Labs jobs passed or failed by session id
pub struct SauceLabsReporter {
    http: reqwest::Client,
    config: SauceLabsConfig,
}

impl SauceLabsReporter {
    pub fn new(config: SauceLabsConfig) -> Result<Self, HarnessError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    fn job_url(&self, session_id: &str) -> String {
        format!(
            "{}/rest/v1/{}/jobs/{}",
            self.config.region_url.trim_end_matches('/'),
            self.config.username,
            session_id
        )
    }

    async fn update_job(&self, session_id: &str, passed: bool) {
        let result = self
            .http
            .put(self.job_url(session_id))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .json(&json!({ "passed": passed }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("Sauce Labs job {} marked passed={}", session_id, passed);
            }
            Ok(resp) => warn!("Sauce Labs rejected update for {}: {}", session_id, resp.status()),
            Err(e) => warn!("Sauce Labs update for {} failed: {}", session_id, e),
        }
    }
}

#[async_trait]
impl RunReporter for SauceLabsReporter {
    async fn on_scenario_passed(&self, _scenario: &str, session_id: &str) {
        self.update_job(session_id, true).await;
    }

    async fn on_scenario_failed(&self, _scenario: &str, session_id: &str, _error: &HarnessError) {
        self.update_job(session_id, false).await;
    }
}

/// Fans each event out to every inner reporter
#[derive(Default, Clone)]
pub struct CompositeReporter {
    reporters: Vec<Arc<dyn RunReporter>>,
}

impl CompositeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

#[async_trait]
impl RunReporter for CompositeReporter {
    async fn on_scenario_passed(&self, scenario: &str, session_id: &str) {
        for reporter in &self.reporters {
            reporter.on_scenario_passed(scenario, session_id).await;
        }
    }

    async fn on_scenario_failed(&self, scenario: &str, session_id: &str, error: &HarnessError) {
        for reporter in &self.reporters {
            reporter.on_scenario_failed(scenario, session_id, error).await;
        }
    }
}
