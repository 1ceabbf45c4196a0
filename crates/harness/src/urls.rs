//! Page URLs of the application under test

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use crate::locale::Locale;

/// Builds self-registration, login and language URLs for one run
#[derive(Debug, Clone)]
pub struct AppUrls {
    web_base_url: String,
    service_redirect_uri: String,
    language_param: String,
    probe_path: String,
}

impl AppUrls {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            web_base_url: config.web_base_url.trim_end_matches('/').to_string(),
            service_redirect_uri: config.service_redirect_uri.clone(),
            language_param: config.locale.query_param.clone(),
            probe_path: config.locale.probe_path.clone(),
        }
    }

    pub fn web_base_url(&self) -> &str {
        &self.web_base_url
    }

    pub fn service_redirect_uri(&self) -> &str {
        &self.service_redirect_uri
    }

    /// `{web}/users/selfRegister?redirect_uri={redirect}&client_id={service}`
    pub fn self_register(&self, service_name: &str) -> String {
        format!(
            "{}/users/selfRegister?redirect_uri={}&client_id={}",
            self.web_base_url, self.service_redirect_uri, service_name
        )
    }

    /// `{web}/login?redirect_uri={redirect}&client_id={service}[&state={state}]`
    pub fn login(&self, service_name: &str, state: Option<&str>) -> String {
        let mut url = format!(
            "{}/login?redirect_uri={}&client_id={}",
            self.web_base_url, self.service_redirect_uri, service_name
        );
        if let Some(state) = state {
            url.push_str("&state=");
            url.push_str(state);
        }
        url
    }

    /// Page used by the language scenarios
    pub fn probe_page(&self) -> String {
        format!("{}{}", self.web_base_url, self.probe_path)
    }

    /// Append the language-forcing query parameter
    pub fn with_language(&self, url: &str, language: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", url, separator, self.language_param, language)
    }

    pub fn force_locale(&self, url: &str, locale: Locale) -> String {
        self.with_language(url, locale.code())
    }

    /// Self-registration URL with the form pre-populated from `details`
    pub fn self_register_prefilled(
        &self,
        service_name: &str,
        details: &RegistrationDetails,
    ) -> HarnessResult<String> {
        Ok(format!(
            "{}&form_data={}",
            self.self_register(service_name),
            urlencoding::encode(&details.encode()?)
        ))
    }
}

/// Payload accepted by the self-registration `form_data` parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl RegistrationDetails {
    /// Base64 of the JSON object
    pub fn encode(&self) -> HarnessResult<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

/// What the service received when the application redirected back to it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl RedirectOutcome {
    pub fn parse(redirect_url: &str) -> HarnessResult<Self> {
        let url = url::Url::parse(redirect_url.trim())?;
        let mut outcome = RedirectOutcome::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => outcome.code = Some(value.into_owned()),
                "state" => outcome.state = Some(value.into_owned()),
                "error" => outcome.error = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(outcome)
    }

    pub fn is_authorized(&self) -> bool {
        self.code.is_some() && self.error.is_none()
    }
}
