//! The actor: everything a scenario step may do
//!
//! One actor exists per scenario attempt. It owns the attempt's browser
//! session and captured artifacts and borrows the shared gateways.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::driver::{BrowserDriver, DriverLauncher};
use crate::error::{HarnessError, HarnessResult};
use crate::gateway::{EmailInbox, EmailMessage, IdentityApi};
use crate::urls::AppUrls;

const URL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Shared, read-only collaborators handed to every actor of a run
pub struct Collaborators {
    pub config: HarnessConfig,
    pub urls: AppUrls,
    pub identity: Arc<dyn IdentityApi>,
    pub inbox: Arc<dyn EmailInbox>,
    pub launcher: Arc<dyn DriverLauncher>,
}

impl Collaborators {
    pub fn new(
        config: HarnessConfig,
        identity: Arc<dyn IdentityApi>,
        inbox: Arc<dyn EmailInbox>,
        launcher: Arc<dyn DriverLauncher>,
    ) -> Self {
        Self {
            urls: AppUrls::new(&config),
            config,
            identity,
            inbox,
            launcher,
        }
    }
}

pub struct Actor {
    driver: Arc<dyn BrowserDriver>,
    collaborators: Arc<Collaborators>,
    artifacts: HashMap<String, String>,
}

impl Actor {
    pub fn new(driver: Arc<dyn BrowserDriver>, collaborators: Arc<Collaborators>) -> Self {
        Self {
            driver,
            collaborators,
            artifacts: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.driver.session_id()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.collaborators.config
    }

    pub fn urls(&self) -> &AppUrls {
        &self.collaborators.urls
    }

    pub fn identity(&self) -> &dyn IdentityApi {
        self.collaborators.identity.as_ref()
    }

    pub async fn navigate(&self, url: &str) -> HarnessResult<()> {
        debug!("[{}] navigate {}", self.session_id(), url);
        self.driver.navigate(url).await
    }

    /// Wait for `text` using the configured default bound
    pub async fn wait_for_text(&self, text: &str) -> HarnessResult<()> {
        self.driver
            .wait_for_text(text, self.config().wait_timeout(), None)
            .await
    }

    pub async fn wait_for_text_within(
        &self,
        text: &str,
        timeout: Duration,
        scope: Option<&str>,
    ) -> HarnessResult<()> {
        self.driver.wait_for_text(text, timeout, scope).await
    }

    pub async fn fill_field(&self, locator: &str, value: &str) -> HarnessResult<()> {
        self.driver.fill_field(locator, value).await
    }

    pub async fn type_text(&self, selector: &str, text: &str) -> HarnessResult<()> {
        self.driver.type_text(selector, text).await
    }

    pub async fn click(&self, locator: &str) -> HarnessResult<()> {
        self.driver.click(locator).await
    }

    pub async fn see(&self, text: &str) -> HarnessResult<()> {
        let page = self.driver.page_text().await?;
        if page.contains(text) {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!("expected to see '{}'", text)))
        }
    }

    pub async fn dont_see(&self, text: &str) -> HarnessResult<()> {
        let page = self.driver.page_text().await?;
        if page.contains(text) {
            Err(HarnessError::assertion(format!("did not expect to see '{}'", text)))
        } else {
            Ok(())
        }
    }

    pub async fn see_in_field(&self, locator: &str, expected: &str) -> HarnessResult<()> {
        let actual = self.driver.field_value(locator).await?;
        if actual == expected {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!(
                "field '{}' holds '{}', expected '{}'",
                locator, actual, expected
            )))
        }
    }

    pub async fn see_title_equals(&self, expected: &str) -> HarnessResult<()> {
        let title = self.driver.title().await?;
        if title == expected {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!("title is '{}', expected '{}'", title, expected)))
        }
    }

    /// Text of an element, e.g. the email shown on a confirmation page
    pub async fn grab_text_from(&self, selector: &str) -> HarnessResult<String> {
        self.driver.text_of(selector, self.config().wait_timeout()).await
    }

    pub async fn grab_current_url(&self) -> HarnessResult<String> {
        self.driver.current_url().await
    }

    pub async fn see_in_current_url(&self, fragment: &str) -> HarnessResult<()> {
        let url = self.driver.current_url().await?;
        if url.contains(fragment) {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!("url '{}' does not contain '{}'", url, fragment)))
        }
    }

    /// Poll the current URL until it contains `fragment`
    pub async fn wait_url_contains(&self, fragment: &str, timeout: Duration) -> HarnessResult<()> {
        let start = Instant::now();
        loop {
            let url = self.driver.current_url().await?;
            if url.contains(fragment) {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(HarnessError::Timeout(format!(
                    "url containing '{}' (last: {})",
                    fragment, url
                )));
            }
            sleep(URL_POLL_INTERVAL).await;
        }
    }

    pub async fn get_cookie(&self, name: &str) -> HarnessResult<Option<String>> {
        self.driver.get_cookie(name).await
    }

    pub async fn set_cookie(&self, name: &str, value: &str) -> HarnessResult<()> {
        self.driver.set_cookie(name, value).await
    }

    pub async fn clear_cookie(&self, name: &str) -> HarnessResult<()> {
        self.driver.clear_cookie(name).await
    }

    pub async fn see_cookie(&self, name: &str, expected: &str) -> HarnessResult<()> {
        match self.driver.get_cookie(name).await? {
            Some(value) if value == expected => Ok(()),
            Some(value) => Err(HarnessError::assertion(format!(
                "cookie {} is '{}', expected '{}'",
                name, value, expected
            ))),
            None => Err(HarnessError::assertion(format!("cookie {} is not set", name))),
        }
    }

    pub async fn set_request_headers(&self, headers: &[(&str, &str)]) -> HarnessResult<()> {
        let headers: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.driver.set_request_headers(&headers).await
    }

    /// Catch the redirect back to the service after sign-in
    ///
    /// The redirect URI page is answered with its own URL so the
    /// authorization code can be asserted on. Interception ends when the
    /// guard is released or dropped.
    pub async fn intercept_requests_after_signin(&self) -> HarnessResult<InterceptionGuard> {
        let prefix = self.urls().service_redirect_uri().to_string();
        self.driver.intercept(&prefix).await?;
        debug!("[{}] intercepting {}", self.session_id(), prefix);
        Ok(InterceptionGuard {
            driver: Arc::clone(&self.driver),
            prefix,
            released: false,
        })
    }

    pub async fn fetch_email_for_address(&self, address: &str) -> HarnessResult<EmailMessage> {
        self.collaborators.inbox.latest_message(address).await
    }

    /// Fetch the newest email for `address` and return its first link
    pub async fn extract_link_from_email(&self, address: &str) -> HarnessResult<String> {
        let message = self.fetch_email_for_address(address).await?;
        message.first_link().ok_or_else(|| {
            HarnessError::NotFound(format!("email '{}' to {} has no link", message.subject, address))
        })
    }

    /// A second actor with its own browser context and no shared state
    pub async fn open_new_browser_context(&self) -> HarnessResult<Actor> {
        let driver = self.collaborators.launcher.launch().await?;
        debug!("[{}] opened sibling session {}", self.session_id(), driver.session_id());
        Ok(Actor::new(driver, Arc::clone(&self.collaborators)))
    }

    pub fn capture(&mut self, key: &str, value: impl Into<String>) {
        self.artifacts.insert(key.to_string(), value.into());
    }

    pub fn captured(&self, key: &str) -> HarnessResult<&str> {
        self.artifacts
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| HarnessError::ArtifactMissing(key.to_string()))
    }

    pub async fn close(&self) -> HarnessResult<()> {
        self.driver.close().await
    }
}

/// Active request interception; ends on `release` or drop
#[must_use = "interception ends as soon as the guard is dropped"]
pub struct InterceptionGuard {
    driver: Arc<dyn BrowserDriver>,
    prefix: String,
    released: bool,
}

impl InterceptionGuard {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn release(mut self) -> HarnessResult<()> {
        self.released = true;
        self.driver.stop_intercepting(&self.prefix).await
    }
}

impl Drop for InterceptionGuard {
    fn drop(&mut self) {
        if !self.released {
            self.driver.stop_intercepting_detached(&self.prefix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::fixtures::{RoleFixture, ServiceFixture, UserFixture};
    use crate::gateway::{NewRole, NewService, NewUser, PendingRegistration, UserDetails};

    #[derive(Default)]
    struct ScriptedDriver {
        page: Mutex<String>,
        urls: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        fn session_id(&self) -> &str {
            "scripted"
        }
        async fn navigate(&self, url: &str) -> HarnessResult<()> {
            self.calls.lock().push(format!("navigate {}", url));
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
            Ok(self.page.lock().clone())
        }
        async fn text_of(&self, _: &str, _: Duration) -> HarnessResult<String> {
            Ok(String::new())
        }
        async fn field_value(&self, _: &str) -> HarnessResult<String> {
            Ok("Lucy".to_string())
        }
        async fn current_url(&self) -> HarnessResult<String> {
            let mut urls = self.urls.lock();
            if urls.len() > 1 {
                Ok(urls.remove(0))
            } else {
                Ok(urls.first().cloned().unwrap_or_default())
            }
        }
        async fn title(&self) -> HarnessResult<String> {
            Ok("Sign in".to_string())
        }
        async fn get_cookie(&self, _: &str) -> HarnessResult<Option<String>> {
            Ok(Some("cy".to_string()))
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
            self.calls.lock().push(format!("intercept {}", prefix));
            Ok(())
        }
        async fn stop_intercepting(&self, prefix: &str) -> HarnessResult<()> {
            self.calls.lock().push(format!("unintercept {}", prefix));
            Ok(())
        }
        fn stop_intercepting_detached(&self, prefix: &str) {
            self.calls.lock().push(format!("unintercept detached {}", prefix));
        }
        async fn close(&self) -> HarnessResult<()> {
            Ok(())
        }
    }

    struct NoIdentity;

    #[async_trait]
    impl IdentityApi for NoIdentity {
        async fn issue_auth_token(&self) -> HarnessResult<String> {
            unimplemented!()
        }
        async fn create_service(&self, _: &NewService) -> HarnessResult<ServiceFixture> {
            unimplemented!()
        }
        async fn create_role(&self, _: &NewRole, _: &str) -> HarnessResult<RoleFixture> {
            unimplemented!()
        }
        async fn create_user(&self, _: &NewUser) -> HarnessResult<UserFixture> {
            unimplemented!()
        }
        async fn get_user_by_id(&self, _: &str, _: &str) -> HarnessResult<UserDetails> {
            unimplemented!()
        }
        async fn get_user_by_email(&self, _: &str) -> HarnessResult<UserDetails> {
            unimplemented!()
        }
        async fn mark_user_stale(&self, _: &str) -> HarnessResult<()> {
            unimplemented!()
        }
        async fn authorize_code(&self, _: &str, _: &str, _: &str, _: &str, _: &str) -> HarnessResult<String> {
            unimplemented!()
        }
        async fn exchange_authorization_code(&self, _: &str, _: &str, _: &str, _: &str) -> HarnessResult<String> {
            unimplemented!()
        }
        async fn register_user_with_id(&self, _: &str, _: &PendingRegistration) -> HarnessResult<()> {
            unimplemented!()
        }
        async fn delete_test_data(&self, _: &str) -> HarnessResult<()> {
            Ok(())
        }
    }

    struct OneMessageInbox;

    #[async_trait]
    impl EmailInbox for OneMessageInbox {
        async fn latest_message(&self, address: &str) -> HarnessResult<EmailMessage> {
            Ok(EmailMessage {
                email_address: address.to_string(),
                subject: "You already have an account".to_string(),
                body: "Sign in as usual.".to_string(),
                created_at: String::new(),
            })
        }
    }

    struct SameDriverLauncher(Arc<ScriptedDriver>);

    #[async_trait]
    impl DriverLauncher for SameDriverLauncher {
        async fn launch(&self) -> HarnessResult<Arc<dyn BrowserDriver>> {
            Ok(self.0.clone())
        }
    }

    fn actor() -> (Actor, Arc<ScriptedDriver>) {
        let driver = Arc::new(ScriptedDriver::default());
        let collaborators = Arc::new(Collaborators::new(
            HarnessConfig::default(),
            Arc::new(NoIdentity),
            Arc::new(OneMessageInbox),
            Arc::new(SameDriverLauncher(driver.clone())),
        ));
        (Actor::new(driver.clone(), collaborators), driver)
    }

    #[tokio::test]
    async fn test_see_and_dont_see() {
        let (actor, driver) = actor();
        *driver.page.lock() = "Check your email".to_string();

        actor.see("Check your email").await.unwrap();
        let err = actor.see("Account created").await.unwrap_err();
        assert!(matches!(err, HarnessError::Assertion(_)));
        actor.dont_see("Account created").await.unwrap();
        assert!(actor.dont_see("your email").await.is_err());
    }

    #[tokio::test]
    async fn test_field_title_and_cookie_assertions() {
        let (actor, _) = actor();
        actor.see_in_field("firstName", "Lucy").await.unwrap();
        assert!(actor.see_in_field("firstName", "Lu").await.is_err());
        actor.see_title_equals("Sign in").await.unwrap();
        actor.see_cookie("idam_ui_locales", "cy").await.unwrap();
        assert!(actor.see_cookie("idam_ui_locales", "en").await.is_err());
    }

    #[tokio::test]
    async fn test_wait_url_contains_polls_until_match() {
        let (actor, driver) = actor();
        *driver.urls.lock() = vec![
            "http://localhost:3501/login".to_string(),
            "https://idam.testservice.gov.uk/?code=abc".to_string(),
        ];
        actor.wait_url_contains("code=", Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_url_contains_times_out() {
        let (actor, driver) = actor();
        *driver.urls.lock() = vec!["http://localhost:3501/login".to_string()];
        let err = actor
            .wait_url_contains("code=", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_artifacts_are_scoped_to_actor() {
        let (mut actor, _) = actor();
        assert!(matches!(actor.captured("activation_url"), Err(HarnessError::ArtifactMissing(_))));
        actor.capture("activation_url", "http://localhost:3501/users/activate?token=t");
        assert_eq!(actor.captured("activation_url").unwrap(), "http://localhost:3501/users/activate?token=t");

        let sibling = actor.open_new_browser_context().await.unwrap();
        assert!(sibling.captured("activation_url").is_err());
    }

    #[tokio::test]
    async fn test_email_without_link_is_not_found() {
        let (actor, _) = actor();
        let err = actor.extract_link_from_email("stale@mailtest.gov.uk").await.unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_interception_guard_release_and_drop() {
        let (actor, driver) = actor();

        let guard = actor.intercept_requests_after_signin().await.unwrap();
        guard.release().await.unwrap();

        {
            let _guard = actor.intercept_requests_after_signin().await.unwrap();
        }

        let calls = driver.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                "intercept https://idam.testservice.gov.uk",
                "unintercept https://idam.testservice.gov.uk",
                "intercept https://idam.testservice.gov.uk",
                "unintercept detached https://idam.testservice.gov.uk",
            ]
        );
    }
}
