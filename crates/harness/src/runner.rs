//! Scenario definitions and the attempt loop
//!
//! A scenario is an ordered list of steps run against a fresh actor. A
//! failing step ends the attempt; a retry starts again from the first step
//! with a new browser session.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::actor::{Actor, Collaborators};
use crate::error::{from_panic, HarnessError, HarnessResult};
use crate::reporter::RunReporter;

/// A step body: borrows the actor mutably and the suite fixtures shared
pub type StepFn<F> =
    dyn for<'a> Fn(&'a mut Actor, &'a F) -> BoxFuture<'a, HarnessResult<()>> + Send + Sync;

pub struct Step<F> {
    name: String,
    run: Arc<StepFn<F>>,
}

impl<F> Step<F> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<F> Clone for Step<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
        }
    }
}

/// How many extra attempts a failing scenario gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retry {
    #[default]
    Never,
    Times(u32),
    /// Use `scenario_retry_limit` from the run configuration
    Configured,
}

impl Retry {
    pub fn limit(&self, configured: u32) -> u32 {
        match self {
            Retry::Never => 0,
            Retry::Times(n) => *n,
            Retry::Configured => configured,
        }
    }
}

pub struct Scenario<F> {
    name: String,
    tags: BTreeSet<String>,
    retry: Retry,
    steps: Vec<Step<F>>,
}

impl<F> Scenario<F> {
    /// Create a scenario from a title; leading `@tag` words become tags
    ///
    /// `"@functional @selfregister I can self register"` is named
    /// `I can self register` and tagged `functional`, `selfregister`.
    pub fn new(title: &str) -> Self {
        let mut tags = BTreeSet::new();
        let mut words = Vec::new();
        for word in title.split_whitespace() {
            match word.strip_prefix('@') {
                Some(tag) if !tag.is_empty() => {
                    tags.insert(tag.to_string());
                }
                _ => words.push(word),
            }
        }

        Self {
            name: words.join(" "),
            tags,
            retry: Retry::Never,
            steps: Vec::new(),
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.trim_start_matches('@').to_string());
        self
    }

    pub fn retry(mut self, times: u32) -> Self {
        self.retry = Retry::Times(times);
        self
    }

    pub fn retry_configured(mut self) -> Self {
        self.retry = Retry::Configured;
        self
    }

    pub fn step<S>(mut self, name: &str, run: S) -> Self
    where
        S: for<'a> Fn(&'a mut Actor, &'a F) -> BoxFuture<'a, HarnessResult<()>> + Send + Sync + 'static,
    {
        self.steps.push(Step {
            name: name.to_string(),
            run: Arc::new(run),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag.trim_start_matches('@'))
    }

    pub fn retry_policy(&self) -> Retry {
        self.retry
    }

    pub fn steps(&self) -> &[Step<F>] {
        &self.steps
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt: u32,
    /// Absent when the browser session could not be started
    pub session_id: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub tags: Vec<String>,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptResult>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl ScenarioResult {
    pub fn skipped<F>(scenario: &Scenario<F>) -> Self {
        Self::terminal(scenario, ScenarioStatus::Skipped, None)
    }

    /// Failed without running, e.g. because suite setup failed
    pub fn not_run<F>(scenario: &Scenario<F>, error: &HarnessError) -> Self {
        Self::terminal(scenario, ScenarioStatus::Failed, Some(error))
    }

    pub fn crashed(name: &str, tags: Vec<String>, message: String) -> Self {
        Self {
            name: name.to_string(),
            tags,
            status: ScenarioStatus::Failed,
            duration_ms: 0,
            attempts: vec![],
            error_kind: Some("panic".to_string()),
            error: Some(message),
        }
    }

    fn terminal<F>(scenario: &Scenario<F>, status: ScenarioStatus, error: Option<&HarnessError>) -> Self {
        Self {
            name: scenario.name.clone(),
            tags: scenario.tags.iter().cloned().collect(),
            status,
            duration_ms: 0,
            attempts: vec![],
            error_kind: error.map(|e| e.kind().to_string()),
            error: error.map(|e| e.to_string()),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Run a scenario to a terminal verdict, retrying within its budget
pub async fn run_scenario<F>(
    scenario: &Scenario<F>,
    fixtures: &F,
    collaborators: &Arc<Collaborators>,
    reporter: &dyn RunReporter,
) -> ScenarioResult
where
    F: Send + Sync,
{
    let start = Instant::now();
    let limit = scenario.retry.limit(collaborators.config.scenario_retry_limit);
    let mut attempts = Vec::new();

    for attempt in 0..=limit {
        let (result, failure) = run_attempt(scenario, fixtures, collaborators, attempt).await;

        if let Some(session_id) = &result.session_id {
            match &failure {
                None => reporter.on_scenario_passed(&scenario.name, session_id).await,
                Some(e) => reporter.on_scenario_failed(&scenario.name, session_id, e).await,
            }
        }

        let success = result.success;
        attempts.push(result);
        if success {
            break;
        }

        if attempt < limit {
            warn!(
                "↻ {} failed on attempt {}/{}, retrying with a fresh session",
                scenario.name,
                attempt + 1,
                limit + 1
            );
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    let last = attempts.last();
    let passed = last.map(|a| a.success).unwrap_or(false);

    if passed {
        info!("✓ {} ({} ms)", scenario.name, duration_ms);
    } else {
        error!(
            "✗ {} - {}",
            scenario.name,
            last.and_then(|a| a.error.as_deref()).unwrap_or("unknown error")
        );
    }

    ScenarioResult {
        name: scenario.name.clone(),
        tags: scenario.tags.iter().cloned().collect(),
        status: if passed { ScenarioStatus::Passed } else { ScenarioStatus::Failed },
        duration_ms,
        error_kind: last.and_then(|a| a.error_kind.clone()),
        error: last.and_then(|a| a.error.clone()),
        attempts,
    }
}

async fn run_attempt<F>(
    scenario: &Scenario<F>,
    fixtures: &F,
    collaborators: &Arc<Collaborators>,
    attempt: u32,
) -> (AttemptResult, Option<HarnessError>)
where
    F: Send + Sync,
{
    let start = Instant::now();

    let driver = match collaborators.launcher.launch().await {
        Ok(driver) => driver,
        Err(e) => {
            let result = AttemptResult {
                attempt,
                session_id: None,
                success: false,
                duration_ms: start.elapsed().as_millis() as u64,
                steps: vec![],
                error_kind: Some(e.kind().to_string()),
                error: Some(e.to_string()),
            };
            return (result, Some(e));
        }
    };

    let session_id = driver.session_id().to_string();
    let mut actor = Actor::new(driver, Arc::clone(collaborators));
    let step_timeout = collaborators.config.step_timeout();
    let mut steps = Vec::new();
    let mut failure = None;

    debug!("Running {} (attempt {}, session {})", scenario.name, attempt, session_id);

    for step in &scenario.steps {
        let step_start = Instant::now();
        let run = AssertUnwindSafe((step.run)(&mut actor, fixtures)).catch_unwind();
        let outcome = match timeout(step_timeout, run).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => Err(from_panic(payload)),
            Err(_) => Err(HarnessError::Timeout(format!(
                "step '{}' exceeded {}s",
                step.name,
                step_timeout.as_secs()
            ))),
        };

        let duration_ms = step_start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => steps.push(StepResult {
                name: step.name.clone(),
                success: true,
                duration_ms,
                error: None,
            }),
            Err(e) => {
                debug!("Step '{}' failed: {}", step.name, e);
                steps.push(StepResult {
                    name: step.name.clone(),
                    success: false,
                    duration_ms,
                    error: Some(e.to_string()),
                });
                failure = Some(e);
                break;
            }
        }
    }

    if let Err(e) = actor.close().await {
        warn!("Failed to close session {}: {}", session_id, e);
    }

    let result = AttemptResult {
        attempt,
        session_id: Some(session_id),
        success: failure.is_none(),
        duration_ms: start.elapsed().as_millis() as u64,
        steps,
        error_kind: failure.as_ref().map(|e| e.kind().to_string()),
        error: failure.as_ref().map(|e| e.to_string()),
    };
    (result, failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn noop<'a>(_: &'a mut Actor, _: &'a ()) -> BoxFuture<'a, HarnessResult<()>> {
        Box::pin(async { Ok(()) })
    }

    #[test_case("@functional @selfregister I can self register", "I can self register", &["functional", "selfregister"])]
    #[test_case("As a user, I can reset my password", "As a user, I can reset my password", &[])]
    #[test_case("@crossbrowser Register @functional twice", "Register twice", &["crossbrowser", "functional"])]
    fn test_title_parsing(title: &str, name: &str, tags: &[&str]) {
        let scenario: Scenario<()> = Scenario::new(title);
        assert_eq!(scenario.name(), name);
        let expected: Vec<&str> = tags.to_vec();
        let actual: Vec<&str> = scenario.tags().iter().map(String::as_str).collect();
        let mut expected_sorted = expected.clone();
        expected_sorted.sort();
        assert_eq!(actual, expected_sorted);
    }

    #[test]
    fn test_builder_keeps_step_order() {
        let scenario: Scenario<()> = Scenario::new("@functional Steps")
            .tag("@welsh")
            .retry(2)
            .step("first", noop)
            .step("second", noop)
            .step("third", noop);

        let names: Vec<&str> = scenario.steps().iter().map(Step::name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(scenario.has_tag("welsh"));
        assert!(scenario.has_tag("@functional"));
        assert_eq!(scenario.retry_policy(), Retry::Times(2));
    }

    #[test_case(Retry::Never, 3, 0)]
    #[test_case(Retry::Times(1), 3, 1)]
    #[test_case(Retry::Configured, 3, 3)]
    fn test_retry_limit(retry: Retry, configured: u32, expected: u32) {
        assert_eq!(retry.limit(configured), expected);
    }
}
