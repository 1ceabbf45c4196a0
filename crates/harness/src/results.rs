//! Run results document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::HarnessResult;
use crate::fixtures::FixtureRecord;
use crate::runner::{ScenarioResult, ScenarioStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    /// Absent when the suite was skipped entirely
    pub prefix: Option<String>,
    pub setup_error: Option<String>,
    pub teardown_error: Option<String>,
    pub fixtures: Vec<FixtureRecord>,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn count(&self, status: ScenarioStatus) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_prefix: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub suites: Vec<SuiteResult>,
}

impl RunSummary {
    pub fn new(run_prefix: &str, started_at: DateTime<Utc>, duration_ms: u64, suites: Vec<SuiteResult>) -> Self {
        let count = |status| suites.iter().map(|s| s.count(status)).sum::<usize>();
        let passed = count(ScenarioStatus::Passed);
        let failed = count(ScenarioStatus::Failed);
        let skipped = count(ScenarioStatus::Skipped);

        Self {
            run_prefix: run_prefix.to_string(),
            started_at,
            total: passed + failed + skipped,
            passed,
            failed,
            skipped,
            duration_ms,
            suites,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Write `test-results.json` into `output_dir`
    pub fn write(&self, output_dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
