//! GOV.UK Notify email gateway
//!
//! Activation and reset emails are delivered asynchronously, so lookups poll
//! the notifications list a bounded number of times before giving up.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::NotifyConfig;
use crate::error::{HarnessError, HarnessResult};

/// A delivered email as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub email_address: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: String,
}

impl EmailMessage {
    /// First link embedded in the body
    pub fn first_link(&self) -> Option<String> {
        first_link(&self.body)
    }
}

#[async_trait]
pub trait EmailInbox: Send + Sync {
    /// Newest message sent to `address`, or `NotFound` once polling is exhausted
    async fn latest_message(&self, address: &str) -> HarnessResult<EmailMessage>;
}

/// Extract the first http(s) URL, dropping markdown punctuation around it
pub fn first_link(body: &str) -> Option<String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let re = LINK.get_or_init(|| Regex::new(r"https?://[^\s<>()\[\]]+").expect("valid link regex"));
    re.find(body)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
}

/// Notify client authenticated with a service API key
pub struct NotifyClient {
    http: reqwest::Client,
    base_url: String,
    service_id: String,
    secret: String,
    poll_attempts: u32,
    poll_interval: Duration,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

#[derive(Deserialize)]
struct NotificationList {
    #[serde(default)]
    notifications: Vec<EmailMessage>,
}

/// UUID length inside a Notify API key
const UUID_LEN: usize = 36;

impl NotifyClient {
    pub fn new(config: &NotifyConfig) -> HarnessResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| HarnessError::Config("notify.api_key is not configured".to_string()))?;
        let (service_id, secret) = split_api_key(api_key)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_id,
            secret,
            poll_attempts: config.poll_attempts.max(1),
            poll_interval: config.poll_interval(),
        })
    }

    fn token(&self) -> HarnessResult<String> {
        let claims = Claims {
            iss: &self.service_id,
            iat: chrono::Utc::now().timestamp(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    async fn list_emails(&self) -> HarnessResult<Vec<EmailMessage>> {
        let response = self
            .http
            .get(format!("{}/v2/notifications", self.base_url))
            .query(&[("template_type", "email")])
            .bearer_auth(self.token()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarnessError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let list: NotificationList = response.json().await?;
        Ok(list.notifications)
    }
}

/// Split `{key_name}-{service_id}-{secret}` into service id and secret
fn split_api_key(api_key: &str) -> HarnessResult<(String, String)> {
    let len = api_key.len();
    if len < UUID_LEN * 2 + 1 || !api_key.is_ascii() {
        return Err(HarnessError::Config("notify.api_key is malformed".to_string()));
    }
    let secret = &api_key[len - UUID_LEN..];
    let service_id = &api_key[len - UUID_LEN * 2 - 1..len - UUID_LEN - 1];
    Ok((service_id.to_string(), secret.to_string()))
}

/// Newest message for `address` in a provider listing
fn newest_for<'a>(messages: &'a [EmailMessage], address: &str) -> Option<&'a EmailMessage> {
    messages
        .iter()
        .filter(|m| m.email_address.eq_ignore_ascii_case(address))
        .max_by(|a, b| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl EmailInbox for NotifyClient {
    async fn latest_message(&self, address: &str) -> HarnessResult<EmailMessage> {
        for attempt in 1..=self.poll_attempts {
            let messages = self.list_emails().await?;
            if let Some(message) = newest_for(&messages, address) {
                info!("Found email '{}' for {} (attempt {})", message.subject, address, attempt);
                return Ok(message.clone());
            }

            debug!("No email for {} yet (attempt {}/{})", address, attempt, self.poll_attempts);
            if attempt < self.poll_attempts {
                sleep(self.poll_interval).await;
            }
        }

        Err(HarnessError::NotFound(format!(
            "no email for {} after {} attempts",
            address, self.poll_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use test_case::test_case;

    const API_KEY: &str =
        "e2e-00000000-1111-2222-3333-444444444444-55555555-6666-7777-8888-999999999999";

    fn config(server: &mockito::ServerGuard, attempts: u32) -> NotifyConfig {
        NotifyConfig {
            base_url: server.url(),
            api_key: Some(API_KEY.to_string()),
            poll_attempts: attempts,
            poll_interval_ms: 5,
        }
    }

    #[test]
    fn test_split_api_key() {
        let (service_id, secret) = split_api_key(API_KEY).unwrap();
        assert_eq!(service_id, "00000000-1111-2222-3333-444444444444");
        assert_eq!(secret, "55555555-6666-7777-8888-999999999999");
        assert!(split_api_key("short").is_err());
    }

    #[test_case(
        "Activate your account: https://idam.example.net/users/activate?token=abc&code=def",
        Some("https://idam.example.net/users/activate?token=abc&code=def") ; "plain"
    )]
    #[test_case(
        "[Reset password](https://idam.example.net/passwordReset?token=t1&code=c1)",
        Some("https://idam.example.net/passwordReset?token=t1&code=c1") ; "markdown"
    )]
    #[test_case("Visit http://localhost:3501/activate.", Some("http://localhost:3501/activate") ; "trailing dot")]
    #[test_case("You already have an account. Sign in as usual.", None ; "no link")]
    fn test_first_link(body: &str, expected: Option<&str>) {
        assert_eq!(first_link(body).as_deref(), expected);
    }

    #[tokio::test]
    async fn test_latest_message_matches_address_case_insensitively() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/notifications")
            .match_query(Matcher::UrlEncoded("template_type".into(), "email".into()))
            .match_header("authorization", Matcher::Regex("^Bearer .+".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"notifications":[
                    {"email_address":"other@mailtest.gov.uk","subject":"Activate","body":"x","created_at":"2026-10-18T10:00:03Z"},
                    {"email_address":"Citizen.A@mailtest.gov.uk","subject":"Old","body":"https://a/old","created_at":"2026-10-18T10:00:01Z"},
                    {"email_address":"citizen.a@mailtest.gov.uk","subject":"New","body":"https://a/new","created_at":"2026-10-18T10:00:02Z"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = NotifyClient::new(&config(&server, 1)).unwrap();
        let message = client.latest_message("CITIZEN.A@mailtest.gov.uk").await.unwrap();
        assert_eq!(message.subject, "New");
        assert_eq!(message.first_link().as_deref(), Some("https://a/new"));
    }

    #[tokio::test]
    async fn test_latest_message_polls_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/notifications")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"notifications":[]}"#)
            .expect(3)
            .create_async()
            .await;

        let client = NotifyClient::new(&config(&server, 3)).unwrap();
        let err = client.latest_message("nobody@mailtest.gov.uk").await.unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(_)));
        mock.assert_async().await;
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let result = NotifyClient::new(&NotifyConfig::default());
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }
}
