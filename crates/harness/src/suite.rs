//! Suites: one setup, many scenarios, one teardown
//!
//! Setup finishes before the first scenario starts. Teardown runs once after
//! every selected scenario is terminal, even when setup failed part way.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::actor::Collaborators;
use crate::config::HarnessConfig;
use crate::error::{from_panic, HarnessError, HarnessResult};
use crate::fixtures::{FixtureKind, FixtureLedger, RoleFixture, ServiceFixture, TestData, UserFixture};
use crate::gateway::{IdentityApi, NewRole, NewService, NewUser};
use crate::reporter::RunReporter;
use crate::results::SuiteResult;
use crate::runner::{run_scenario, Scenario, ScenarioResult};
use crate::urls::AppUrls;

/// Everything setup and teardown may touch
#[derive(Clone)]
pub struct SuiteContext {
    data: TestData,
    ledger: Arc<FixtureLedger>,
    collaborators: Arc<Collaborators>,
}

impl SuiteContext {
    pub fn new(data: TestData, collaborators: Arc<Collaborators>) -> Self {
        Self {
            data,
            ledger: Arc::new(FixtureLedger::default()),
            collaborators,
        }
    }

    pub fn data(&self) -> &TestData {
        &self.data
    }

    pub fn ledger(&self) -> &FixtureLedger {
        &self.ledger
    }

    pub fn identity(&self) -> &dyn IdentityApi {
        self.collaborators.identity.as_ref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.collaborators.config
    }

    pub fn urls(&self) -> &AppUrls {
        &self.collaborators.urls
    }

    /// Register a service redirecting to the configured redirect URI
    pub async fn create_service(
        &self,
        role_ids: Vec<String>,
        scopes: Option<&str>,
    ) -> HarnessResult<ServiceFixture> {
        let request = NewService {
            name: self.data.service_name(),
            client_secret: Some(self.data.client_secret()),
            redirect_uri: self.config().service_redirect_uri.clone(),
            role_ids,
            scopes: scopes.map(str::to_string),
        };
        let service = self.identity().create_service(&request).await?;
        self.ledger.record(FixtureKind::Service, &service.name);
        Ok(service)
    }

    pub async fn create_role(
        &self,
        description: &str,
        parent_role_id: Option<&str>,
        auth_token: &str,
    ) -> HarnessResult<RoleFixture> {
        let request = NewRole {
            name: self.data.role_name(),
            description: description.to_string(),
            parent_role_id: parent_role_id.map(str::to_string),
        };
        let role = self.identity().create_role(&request, auth_token).await?;
        self.ledger.record(FixtureKind::Role, &role.name);
        Ok(role)
    }

    pub async fn create_user(&self, email: &str, forename: &str, roles: &[&str]) -> HarnessResult<UserFixture> {
        let request = NewUser {
            email: email.to_string(),
            password: self.data.password(),
            forename: forename.to_string(),
            surname: "User".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        let user = self.identity().create_user(&request).await?;
        self.ledger.record(FixtureKind::User, &user.email);
        Ok(user)
    }

    /// An active citizen account with a prefixed name
    pub async fn create_citizen(&self, label: &str) -> HarnessResult<UserFixture> {
        let email = self.data.email(label);
        let forename = self.data.user_name();
        self.create_user(&email, &forename, &["citizen"]).await
    }

    /// A citizen account that has been retired as stale
    pub async fn create_stale_citizen(&self, label: &str) -> HarnessResult<UserFixture> {
        let user = self.create_citizen(label).await?;
        self.identity().mark_user_stale(&user.email).await?;
        Ok(user)
    }
}

pub type SetupFn<F> = dyn Fn(SuiteContext) -> BoxFuture<'static, HarnessResult<F>> + Send + Sync;
pub type TeardownFn = dyn Fn(SuiteContext) -> BoxFuture<'static, HarnessResult<()>> + Send + Sync;

/// Shared run-wide state for executing suites
#[derive(Clone)]
pub struct RunEnvironment {
    pub collaborators: Arc<Collaborators>,
    pub reporter: Arc<dyn RunReporter>,
    /// Run-level data; each suite derives its own prefix from it
    pub data: TestData,
}

impl RunEnvironment {
    pub fn new(collaborators: Arc<Collaborators>, reporter: Arc<dyn RunReporter>) -> Self {
        let data = TestData::new(
            &collaborators.config.test_data_prefix,
            &collaborators.config.email_domain,
        );
        Self {
            collaborators,
            reporter,
            data,
        }
    }
}

/// Which scenarios of a run are selected
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    /// Every listed tag must be present
    pub tags: Vec<String>,
    /// None of these may be present
    pub exclude_tags: Vec<String>,
    /// Case-insensitive substring of the scenario name
    pub name: Option<String>,
}

impl ScenarioFilter {
    pub fn matches<F>(&self, scenario: &Scenario<F>) -> bool {
        self.tags.iter().all(|t| scenario.has_tag(t))
            && !self.exclude_tags.iter().any(|t| scenario.has_tag(t))
            && self
                .name
                .as_ref()
                .map(|n| scenario.name().to_lowercase().contains(&n.to_lowercase()))
                .unwrap_or(true)
    }
}

pub struct Suite<F> {
    name: String,
    setup: Arc<SetupFn<F>>,
    teardown: Arc<TeardownFn>,
    scenarios: Vec<Arc<Scenario<F>>>,
}

impl<F: Send + Sync + 'static> Suite<F> {
    /// A suite whose fixtures come from `setup`; teardown defaults to
    /// deleting everything carrying the suite prefix
    pub fn new<S>(name: &str, setup: S) -> Self
    where
        S: Fn(SuiteContext) -> BoxFuture<'static, HarnessResult<F>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            setup: Arc::new(setup),
            teardown: Arc::new(|ctx: SuiteContext| -> BoxFuture<'static, HarnessResult<()>> {
                Box::pin(async move {
                    let prefix = ctx.data().prefix().to_string();
                    ctx.identity().delete_test_data(&prefix).await
                })
            }),
            scenarios: Vec::new(),
        }
    }

    pub fn after_suite<T>(mut self, teardown: T) -> Self
    where
        T: Fn(SuiteContext) -> BoxFuture<'static, HarnessResult<()>> + Send + Sync + 'static,
    {
        self.teardown = Arc::new(teardown);
        self
    }

    pub fn scenario(mut self, scenario: Scenario<F>) -> Self {
        self.scenarios.push(Arc::new(scenario));
        self
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario<F>> {
        self.scenarios.iter().map(|s| s.as_ref())
    }

    async fn execute(&self, env: &RunEnvironment, filter: &ScenarioFilter) -> SuiteResult {
        let start = Instant::now();
        let selected: Vec<bool> = self.scenarios.iter().map(|s| filter.matches(s.as_ref())).collect();

        if !selected.iter().any(|s| *s) {
            info!("Suite '{}': no selected scenarios, skipping", self.name);
            return SuiteResult {
                name: self.name.clone(),
                prefix: None,
                setup_error: None,
                teardown_error: None,
                fixtures: vec![],
                duration_ms: 0,
                scenarios: self.scenarios.iter().map(|s| ScenarioResult::skipped(s.as_ref())).collect(),
            };
        }

        let ctx = SuiteContext::new(
            TestData::new(env.data.prefix(), &env.collaborators.config.email_domain),
            Arc::clone(&env.collaborators),
        );
        info!("Suite '{}' (prefix {})", self.name, ctx.data().prefix());

        let setup = AssertUnwindSafe((self.setup)(ctx.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(from_panic(payload)));
        let (scenarios, setup_error) = match setup {
            Ok(fixtures) => (self.run_scenarios(Arc::new(fixtures), &selected, env).await, None),
            Err(e) => {
                error!("Suite '{}' setup failed: {}", self.name, e);
                let error = HarnessError::Setup(e.to_string());
                let results = self
                    .scenarios
                    .iter()
                    .zip(&selected)
                    .map(|(s, selected)| {
                        if *selected {
                            ScenarioResult::not_run(s.as_ref(), &error)
                        } else {
                            ScenarioResult::skipped(s)
                        }
                    })
                    .collect();
                (results, Some(e.to_string()))
            }
        };

        let teardown = AssertUnwindSafe((self.teardown)(ctx.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(from_panic(payload)));
        let teardown_error = match teardown {
            Ok(()) => None,
            Err(e) => {
                warn!("Suite '{}' teardown failed: {}", self.name, e);
                Some(e.to_string())
            }
        };

        let foreign = ctx.ledger().foreign(ctx.data());
        if !foreign.is_empty() {
            warn!("Suite '{}' created {} fixture(s) outside its prefix", self.name, foreign.len());
        }

        SuiteResult {
            name: self.name.clone(),
            prefix: Some(ctx.data().prefix().to_string()),
            setup_error,
            teardown_error,
            fixtures: ctx.ledger().records(),
            duration_ms: start.elapsed().as_millis() as u64,
            scenarios,
        }
    }

    /// Run selected scenarios concurrently, each on its own task
    async fn run_scenarios(
        &self,
        fixtures: Arc<F>,
        selected: &[bool],
        env: &RunEnvironment,
    ) -> Vec<ScenarioResult> {
        let permits = Arc::new(Semaphore::new(env.collaborators.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(self.scenarios.len());

        for (scenario, selected) in self.scenarios.iter().zip(selected) {
            if !*selected {
                handles.push((Arc::clone(scenario), None));
                continue;
            }

            let task_scenario = Arc::clone(scenario);
            let fixtures = Arc::clone(&fixtures);
            let collaborators = Arc::clone(&env.collaborators);
            let reporter = Arc::clone(&env.reporter);
            let permits = Arc::clone(&permits);

            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                run_scenario(task_scenario.as_ref(), fixtures.as_ref(), &collaborators, reporter.as_ref()).await
            });
            handles.push((Arc::clone(scenario), Some(handle)));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (scenario, handle) in handles {
            let result = match handle {
                None => ScenarioResult::skipped(scenario.as_ref()),
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("✗ {} - crashed: {}", scenario.name(), e);
                        ScenarioResult::crashed(
                            scenario.name(),
                            scenario.tags().iter().cloned().collect(),
                            e.to_string(),
                        )
                    }
                },
            };
            results.push(result);
        }
        results
    }
}

/// Summary of one scenario as listed before a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub retry_limit: u32,
    pub steps: Vec<String>,
}

/// A suite with its fixture type erased so suites can share a registry
#[async_trait]
pub trait RegisteredSuite: Send + Sync {
    fn name(&self) -> &str;

    fn describe(&self, config: &HarnessConfig) -> Vec<ScenarioInfo>;

    async fn run(&self, env: &RunEnvironment, filter: &ScenarioFilter) -> SuiteResult;
}

#[async_trait]
impl<F: Send + Sync + 'static> RegisteredSuite for Suite<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self, config: &HarnessConfig) -> Vec<ScenarioInfo> {
        self.scenarios()
            .map(|s| ScenarioInfo {
                name: s.name().to_string(),
                tags: s.tags().iter().cloned().collect(),
                retry_limit: s.retry_policy().limit(config.scenario_retry_limit),
                steps: s.steps().iter().map(|step| step.name().to_string()).collect(),
            })
            .collect()
    }

    async fn run(&self, env: &RunEnvironment, filter: &ScenarioFilter) -> SuiteResult {
        self.execute(env, filter).await
    }
}
