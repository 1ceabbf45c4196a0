//! Browser automation contract
//!
//! A driver is bound to exactly one isolated browser context (cookies,
//! storage, current page). Drivers are never shared between scenarios.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::HarnessResult;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Opaque identifier forwarded to run reporters
    fn session_id(&self) -> &str;

    /// Load a page; `Navigation` on network failure or timeout
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Wait until `text` is rendered inside `scope` (default: body)
    async fn wait_for_text(&self, text: &str, timeout: Duration, scope: Option<&str>) -> HarnessResult<()>;

    /// Fill a field located by name, id, label or CSS selector
    async fn fill_field(&self, locator: &str, value: &str) -> HarnessResult<()>;

    /// Type into a CSS-selected element key by key
    async fn type_text(&self, selector: &str, text: &str) -> HarnessResult<()>;

    /// Click a button or link located by its text, or a CSS selector
    async fn click(&self, locator: &str) -> HarnessResult<()>;

    /// Visible text of the whole page
    async fn page_text(&self) -> HarnessResult<String>;

    /// Trimmed text content of the first element matching `selector`
    async fn text_of(&self, selector: &str, timeout: Duration) -> HarnessResult<String>;

    async fn field_value(&self, locator: &str) -> HarnessResult<String>;

    async fn current_url(&self) -> HarnessResult<String>;

    async fn title(&self) -> HarnessResult<String>;

    async fn get_cookie(&self, name: &str) -> HarnessResult<Option<String>>;

    async fn set_cookie(&self, name: &str, value: &str) -> HarnessResult<()>;

    async fn clear_cookie(&self, name: &str) -> HarnessResult<()>;

    /// Extra headers sent with every subsequent request of this context
    async fn set_request_headers(&self, headers: &[(String, String)]) -> HarnessResult<()>;

    /// Answer every request starting with `url_prefix` with its own URL as plain text
    async fn intercept(&self, url_prefix: &str) -> HarnessResult<()>;

    async fn stop_intercepting(&self, url_prefix: &str) -> HarnessResult<()>;

    /// Queue `stop_intercepting` without waiting for it; usable from `Drop`
    fn stop_intercepting_detached(&self, url_prefix: &str);

    async fn close(&self) -> HarnessResult<()>;
}

/// Creates a fresh, fully isolated driver per Run Session
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self) -> HarnessResult<Arc<dyn BrowserDriver>>;
}
