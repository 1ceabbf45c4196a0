//! Registry of suites for one run

use chrono::Utc;
use std::time::Instant;
use tracing::info;

use crate::config::HarnessConfig;
use crate::results::RunSummary;
use crate::suite::{RegisteredSuite, RunEnvironment, ScenarioFilter, ScenarioInfo};

#[derive(Default)]
pub struct Registry {
    suites: Vec<Box<dyn RegisteredSuite>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, suite: impl RegisteredSuite + 'static) -> Self {
        self.suites.push(Box::new(suite));
        self
    }

    /// Every registered scenario, grouped by suite name
    pub fn describe(&self, config: &HarnessConfig) -> Vec<(String, Vec<ScenarioInfo>)> {
        self.suites
            .iter()
            .map(|s| (s.name().to_string(), s.describe(config)))
            .collect()
    }

    /// Run suites one after another; scenarios inside a suite run concurrently
    pub async fn run(&self, env: &RunEnvironment, filter: &ScenarioFilter) -> RunSummary {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.suites.len());

        info!("Running {} suite(s) with run prefix {}", self.suites.len(), env.data.prefix());

        for suite in &self.suites {
            results.push(suite.run(env, filter).await);
        }

        let summary = RunSummary::new(
            env.data.prefix(),
            started_at,
            start.elapsed().as_millis() as u64,
            results,
        );

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            summary.passed, summary.failed, summary.skipped, summary.duration_ms
        );
        summary
    }
}
