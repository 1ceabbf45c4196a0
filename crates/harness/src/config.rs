//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::playwright::Browser;

/// Top-level configuration for a scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root URL for all page navigation
    pub web_base_url: String,

    /// Identity API used for fixture provisioning and teardown
    pub idam_api_url: String,

    /// Admin account allowed to manage roles through the identity API
    pub api_admin: Option<ApiCredentials>,

    /// Redirect URI registered on every generated service
    pub service_redirect_uri: String,

    /// Default retry count for scenarios that opt into retries
    pub scenario_retry_limit: u32,

    /// Base prefix for generated fixtures; a random run suffix is appended
    pub test_data_prefix: String,

    /// Domain used for generated fixture email addresses
    pub email_domain: String,

    /// Scenarios of one suite allowed to run at the same time
    pub concurrency: usize,

    /// Per-step wall clock budget
    pub step_timeout_secs: u64,

    /// Default bound for `wait_for_text` and friends
    pub wait_timeout_secs: u64,

    /// Where the results document is written
    pub output_dir: PathBuf,

    pub browser: BrowserConfig,
    pub notify: NotifyConfig,
    pub reporting: ReportingConfig,
    pub locale: LocaleConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            web_base_url: "http://localhost:3501".to_string(),
            idam_api_url: "http://localhost:5000".to_string(),
            api_admin: None,
            service_redirect_uri: "https://idam.testservice.gov.uk".to_string(),
            scenario_retry_limit: 3,
            test_data_prefix: "idamwebtest".to_string(),
            email_domain: "mailtest.gov.uk".to_string(),
            concurrency: 4,
            step_timeout_secs: 120,
            wait_timeout_secs: 30,
            output_dir: PathBuf::from("test-results"),
            browser: BrowserConfig::default(),
            notify: NotifyConfig::default(),
            reporting: ReportingConfig::default(),
            locale: LocaleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub username: String,
    pub password: String,
}

/// Browser session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Implicit wait applied when locating fields and buttons
    pub implicit_wait_ms: u64,

    /// Node executable used to host the Playwright bridge
    pub node_binary: String,

    /// Directory whose node_modules provides Playwright
    pub project_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 960,
            implicit_wait_ms: 5000,
            node_binary: "node".to_string(),
            project_dir: PathBuf::from("."),
        }
    }
}

/// GOV.UK Notify access used to read activation and reset emails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.notifications.service.gov.uk".to_string(),
            api_key: None,
            poll_attempts: 10,
            poll_interval_ms: 3000,
        }
    }
}

impl NotifyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub sauce_labs: Option<SauceLabsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SauceLabsConfig {
    pub username: String,
    pub access_key: String,
    #[serde(default = "default_sauce_region_url")]
    pub region_url: String,
}

pub fn default_sauce_region_url() -> String {
    "https://eu-central-1.saucelabs.com".to_string()
}

/// Names the application uses for language selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    pub cookie_name: String,
    pub query_param: String,

    /// Page rendering "Access Denied" when opened without a client
    pub probe_path: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            cookie_name: "idam_ui_locales".to_string(),
            query_param: "lng".to_string(),
            probe_path: "/login".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file, falling back to defaults for absent keys
    pub fn from_yaml_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Reject configurations that cannot possibly drive a run
    pub fn validate(&self) -> HarnessResult<()> {
        for (field, value) in [
            ("web_base_url", &self.web_base_url),
            ("idam_api_url", &self.idam_api_url),
            ("service_redirect_uri", &self.service_redirect_uri),
            ("notify.base_url", &self.notify.base_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| HarnessError::Config(format!("{}: {} ({})", field, value, e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(HarnessError::Config(format!(
                    "{} must be an http(s) URL, got {}",
                    field, value
                )));
            }
        }

        if self.test_data_prefix.is_empty()
            || !self.test_data_prefix.chars().all(|c| c.is_ascii_lowercase())
        {
            return Err(HarnessError::Config(format!(
                "test_data_prefix must be non-empty lowercase letters, got '{}'",
                self.test_data_prefix
            )));
        }

        if self.concurrency == 0 {
            return Err(HarnessError::Config("concurrency must be at least 1".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        HarnessConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
web_base_url: https://idam-web-public.aat.platform.hmcts.net
scenario_retry_limit: 1
browser:
  browser: firefox
  headless: false
notify:
  api_key: key-name-00000000-0000-0000-0000-000000000000-11111111-1111-1111-1111-111111111111
"#;
        let config = HarnessConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.web_base_url, "https://idam-web-public.aat.platform.hmcts.net");
        assert_eq!(config.scenario_retry_limit, 1);
        assert!(matches!(config.browser.browser, Browser::Firefox));
        assert!(!config.browser.headless);
        assert_eq!(config.browser.viewport_width, 1280);
        assert_eq!(config.notify.poll_attempts, 10);
        assert_eq!(config.locale.cookie_name, "idam_ui_locales");
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let config = HarnessConfig {
            web_base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_prefix_with_digits() {
        let config = HarnessConfig {
            test_data_prefix: "run42".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
