//! In-process fakes for lifecycle tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use idam_harness::fixtures::{RoleFixture, ServiceFixture, UserFixture};
use idam_harness::gateway::{
    EmailInbox, EmailMessage, IdentityApi, NewRole, NewService, NewUser, PendingRegistration, UserDetails,
};
use idam_harness::reporter::RunReporter;
use idam_harness::{
    BrowserDriver, Collaborators, DriverLauncher, HarnessConfig, HarnessError, HarnessResult, RunEnvironment,
};

/// Ordered log shared by every fake
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct FakeDriver {
    id: String,
    events: Events,
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    fn session_id(&self) -> &str {
        &self.id
    }
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.events.push(format!("navigate {} {}", self.id, url));
        Ok(())
    }
    async fn wait_for_text(&self, _: &str, _: Duration, _: Option<&str>) -> HarnessResult<()> {
        Ok(())
    }
    async fn fill_field(&self, _: &str, _: &str) -> HarnessResult<()> {
        Ok(())
    }
    async fn type_text(&self, _: &str, _: &str) -> HarnessResult<()> {
        Ok(())
    }
    async fn click(&self, _: &str) -> HarnessResult<()> {
        Ok(())
    }
    async fn page_text(&self) -> HarnessResult<String> {
        Ok(String::new())
    }
    async fn text_of(&self, _: &str, _: Duration) -> HarnessResult<String> {
        Ok(String::new())
    }
    async fn field_value(&self, _: &str) -> HarnessResult<String> {
        Ok(String::new())
    }
    async fn current_url(&self) -> HarnessResult<String> {
        Ok(String::new())
    }
    async fn title(&self) -> HarnessResult<String> {
        Ok(String::new())
    }
    async fn get_cookie(&self, _: &str) -> HarnessResult<Option<String>> {
        Ok(None)
    }
    async fn set_cookie(&self, _: &str, _: &str) -> HarnessResult<()> {
        Ok(())
    }
    async fn clear_cookie(&self, _: &str) -> HarnessResult<()> {
        Ok(())
    }
    async fn set_request_headers(&self, _: &[(String, String)]) -> HarnessResult<()> {
        Ok(())
    }
    async fn intercept(&self, prefix: &str) -> HarnessResult<()> {
        self.events.push(format!("intercept {} {}", self.id, prefix));
        Ok(())
    }
    async fn stop_intercepting(&self, prefix: &str) -> HarnessResult<()> {
        self.events.push(format!("unintercept {} {}", self.id, prefix));
        Ok(())
    }
    fn stop_intercepting_detached(&self, prefix: &str) {
        self.events.push(format!("unintercept {} {}", self.id, prefix));
    }
    async fn close(&self) -> HarnessResult<()> {
        self.events.push(format!("close {}", self.id));
        Ok(())
    }
}

pub struct FakeLauncher {
    events: Events,
    launched: AtomicUsize,
}

#[async_trait]
impl DriverLauncher for FakeLauncher {
    async fn launch(&self) -> HarnessResult<Arc<dyn BrowserDriver>> {
        let n = self.launched.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("session-{}", n);
        self.events.push(format!("launch {}", id));
        Ok(Arc::new(FakeDriver {
            id,
            events: self.events.clone(),
        }))
    }
}

#[derive(Clone, Copy, Default)]
pub struct IdentityBehaviour {
    pub fail_create_user: bool,
    pub fail_delete: bool,
}

pub struct FakeIdentity {
    events: Events,
    behaviour: IdentityBehaviour,
}

fn rejected() -> HarnessError {
    HarnessError::Api {
        status: 500,
        message: "rejected".to_string(),
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn issue_auth_token(&self) -> HarnessResult<String> {
        Ok("auth-token".to_string())
    }
    async fn create_service(&self, service: &NewService) -> HarnessResult<ServiceFixture> {
        self.events.push(format!("create_service {}", service.name));
        Ok(ServiceFixture {
            name: service.name.clone(),
            client_secret: service.client_secret.clone(),
            role_ids: service.role_ids.clone(),
            scopes: service.scopes.clone(),
        })
    }
    async fn create_role(&self, role: &NewRole, _: &str) -> HarnessResult<RoleFixture> {
        Ok(RoleFixture {
            id: format!("{}-id", role.name),
            name: role.name.clone(),
            description: role.description.clone(),
            parent_role_id: role.parent_role_id.clone(),
        })
    }
    async fn create_user(&self, user: &NewUser) -> HarnessResult<UserFixture> {
        if self.behaviour.fail_create_user {
            return Err(rejected());
        }
        self.events.push(format!("create_user {}", user.email));
        Ok(UserFixture {
            id: Some("user-id".to_string()),
            email: user.email.clone(),
            password: user.password.clone(),
            forename: user.forename.clone(),
            surname: user.surname.clone(),
            roles: user.roles.clone(),
        })
    }
    async fn get_user_by_id(&self, _: &str, _: &str) -> HarnessResult<UserDetails> {
        Err(rejected())
    }
    async fn get_user_by_email(&self, _: &str) -> HarnessResult<UserDetails> {
        Err(rejected())
    }
    async fn mark_user_stale(&self, email: &str) -> HarnessResult<()> {
        self.events.push(format!("stale {}", email));
        Ok(())
    }
    async fn authorize_code(&self, _: &str, _: &str, _: &str, _: &str, _: &str) -> HarnessResult<String> {
        Ok("code".to_string())
    }
    async fn exchange_authorization_code(&self, _: &str, _: &str, _: &str, _: &str) -> HarnessResult<String> {
        Ok("access-token".to_string())
    }
    async fn register_user_with_id(&self, _: &str, _: &PendingRegistration) -> HarnessResult<()> {
        Ok(())
    }
    async fn delete_test_data(&self, prefix: &str) -> HarnessResult<()> {
        self.events.push(format!("teardown {}", prefix));
        if self.behaviour.fail_delete {
            return Err(rejected());
        }
        Ok(())
    }
}

pub struct EmptyInbox;

#[async_trait]
impl EmailInbox for EmptyInbox {
    async fn latest_message(&self, address: &str) -> HarnessResult<EmailMessage> {
        Err(HarnessError::NotFound(address.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

#[async_trait]
impl RunReporter for RecordingReporter {
    async fn on_scenario_passed(&self, scenario: &str, session_id: &str) {
        self.events.lock().push(format!("passed {} {}", scenario, session_id));
    }

    async fn on_scenario_failed(&self, scenario: &str, session_id: &str, error: &HarnessError) {
        self.events
            .lock()
            .push(format!("failed {} {} {}", scenario, session_id, error.kind()));
    }
}

pub struct Harness {
    pub events: Events,
    pub reporter: Arc<RecordingReporter>,
    pub env: RunEnvironment,
}

pub fn harness(config: HarnessConfig, behaviour: IdentityBehaviour) -> Harness {
    let events = Events::default();
    let reporter = Arc::new(RecordingReporter::default());
    let collaborators = Arc::new(Collaborators::new(
        config,
        Arc::new(FakeIdentity {
            events: events.clone(),
            behaviour,
        }),
        Arc::new(EmptyInbox),
        Arc::new(FakeLauncher {
            events: events.clone(),
            launched: AtomicUsize::new(0),
        }),
    ));
    let env = RunEnvironment::new(collaborators, reporter.clone());
    Harness { events, reporter, env }
}
