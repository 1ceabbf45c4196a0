//! Identity API gateway used for fixture provisioning and teardown

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ApiCredentials;
use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::{RoleFixture, ServiceFixture, UserFixture};

/// Service registration request
#[derive(Debug, Clone, Default)]
pub struct NewService {
    pub name: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub role_ids: Vec<String>,
    /// Space separated OAuth scopes, e.g. `create-user manage-user`
    pub scopes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: String,
    pub parent_role_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub forename: String,
    pub surname: String,
    pub roles: Vec<String>,
}

/// Registration that stays pending until the emailed link is used
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub id: String,
    pub email: String,
    pub forename: String,
    pub surname: String,
    pub role: String,
}

/// User as reported by the identity API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub forename: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Operations the suites consume from the identity system
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Admin API token used for role management
    async fn issue_auth_token(&self) -> HarnessResult<String>;

    async fn create_service(&self, service: &NewService) -> HarnessResult<ServiceFixture>;

    async fn create_role(&self, role: &NewRole, auth_token: &str) -> HarnessResult<RoleFixture>;

    async fn create_user(&self, user: &NewUser) -> HarnessResult<UserFixture>;

    async fn get_user_by_id(&self, id: &str, access_token: &str) -> HarnessResult<UserDetails>;

    async fn get_user_by_email(&self, email: &str) -> HarnessResult<UserDetails>;

    /// Retire an account so its activation state becomes stale
    async fn mark_user_stale(&self, email: &str) -> HarnessResult<()>;

    /// Obtain an authorization code with the user's credentials
    async fn authorize_code(
        &self,
        service_name: &str,
        redirect_uri: &str,
        scope: &str,
        username: &str,
        password: &str,
    ) -> HarnessResult<String>;

    async fn exchange_authorization_code(
        &self,
        code: &str,
        service_name: &str,
        redirect_uri: &str,
        client_secret: &str,
    ) -> HarnessResult<String>;

    async fn register_user_with_id(
        &self,
        access_token: &str,
        registration: &PendingRegistration,
    ) -> HarnessResult<()>;

    /// Bulk-delete every service, role and user carrying `prefix`
    async fn delete_test_data(&self, prefix: &str) -> HarnessResult<()>;
}

/// reqwest-backed identity API client
pub struct IdamApiClient {
    http: reqwest::Client,
    base_url: String,
    admin: Option<ApiCredentials>,
}

#[derive(Deserialize)]
struct AuthTokenResponse {
    api_auth_token: String,
}

#[derive(Deserialize)]
struct CodeResponse {
    code: String,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct CreatedAccount {
    id: Option<String>,
}

impl IdamApiClient {
    pub fn new(base_url: &str, admin: Option<ApiCredentials>) -> HarnessResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            admin,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into `HarnessError::Api`
async fn check(response: reqwest::Response) -> HarnessResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(HarnessError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl IdentityApi for IdamApiClient {
    async fn issue_auth_token(&self) -> HarnessResult<String> {
        let admin = self.admin.as_ref().ok_or_else(|| {
            HarnessError::Config("identity API admin credentials are not configured".to_string())
        })?;

        let response = self
            .http
            .post(self.url("/loginUser"))
            .form(&[("username", admin.username.as_str()), ("password", admin.password.as_str())])
            .send()
            .await?;
        let body: AuthTokenResponse = check(response).await?.json().await?;
        Ok(body.api_auth_token)
    }

    async fn create_service(&self, service: &NewService) -> HarnessResult<ServiceFixture> {
        let body = json!({
            "label": service.name,
            "description": service.name,
            "oauth2ClientId": service.name,
            "oauth2ClientSecret": service.client_secret,
            "oauth2RedirectUris": [service.redirect_uri],
            "oauth2Scope": service.scopes,
            "onboardingRoles": service.role_ids,
            "selfRegistrationAllowed": true,
        });

        check(
            self.http
                .post(self.url("/testing-support/services"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        info!("Created service {}", service.name);
        Ok(ServiceFixture {
            name: service.name.clone(),
            client_secret: service.client_secret.clone(),
            role_ids: service.role_ids.clone(),
            scopes: service.scopes.clone(),
        })
    }

    async fn create_role(&self, role: &NewRole, auth_token: &str) -> HarnessResult<RoleFixture> {
        let id = uuid::Uuid::new_v4().to_string();
        let assignable: Vec<&str> = role.parent_role_id.iter().map(String::as_str).collect();
        let body = json!({
            "id": id,
            "name": role.name,
            "description": role.description,
            "assignableRoles": assignable,
            "conflictingRoles": [],
        });

        check(
            self.http
                .post(self.url("/roles"))
                .header("Authorization", format!("AdminApiAuthToken {}", auth_token))
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        info!("Created role {} ({})", role.name, id);
        Ok(RoleFixture {
            id,
            name: role.name.clone(),
            description: role.description.clone(),
            parent_role_id: role.parent_role_id.clone(),
        })
    }

    async fn create_user(&self, user: &NewUser) -> HarnessResult<UserFixture> {
        let roles: Vec<_> = user.roles.iter().map(|r| json!({ "code": r })).collect();
        let body = json!({
            "email": user.email,
            "forename": user.forename,
            "surname": user.surname,
            "password": user.password,
            "roles": roles,
        });

        let response = check(
            self.http
                .post(self.url("/testing-support/accounts"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        let created: CreatedAccount = response.json().await.unwrap_or(CreatedAccount { id: None });

        debug!("Created user {}", user.email);
        Ok(UserFixture {
            id: created.id,
            email: user.email.clone(),
            password: user.password.clone(),
            forename: user.forename.clone(),
            surname: user.surname.clone(),
            roles: user.roles.clone(),
        })
    }

    async fn get_user_by_id(&self, id: &str, access_token: &str) -> HarnessResult<UserDetails> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/users/{}", id)))
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn get_user_by_email(&self, email: &str) -> HarnessResult<UserDetails> {
        let response = self
            .http
            .get(self.url("/users"))
            .query(&[("email", email)])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn mark_user_stale(&self, email: &str) -> HarnessResult<()> {
        let user = self.get_user_by_email(email).await?;
        check(
            self.http
                .post(self.url(&format!("/api/v1/staleUsers/{}/retire", user.id)))
                .send()
                .await?,
        )
        .await?;
        info!("Retired stale user {}", email);
        Ok(())
    }

    async fn authorize_code(
        &self,
        service_name: &str,
        redirect_uri: &str,
        scope: &str,
        username: &str,
        password: &str,
    ) -> HarnessResult<String> {
        let credentials = STANDARD.encode(format!("{}:{}", username, password));
        let response = self
            .http
            .post(self.url("/oauth2/authorize"))
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[
                ("response_type", "code"),
                ("client_id", service_name),
                ("redirect_uri", redirect_uri),
                ("scope", scope),
            ])
            .send()
            .await?;
        let body: CodeResponse = check(response).await?.json().await?;
        Ok(body.code)
    }

    async fn exchange_authorization_code(
        &self,
        code: &str,
        service_name: &str,
        redirect_uri: &str,
        client_secret: &str,
    ) -> HarnessResult<String> {
        let response = self
            .http
            .post(self.url("/oauth2/token"))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", service_name),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;
        let body: AccessTokenResponse = check(response).await?.json().await?;
        Ok(body.access_token)
    }

    async fn register_user_with_id(
        &self,
        access_token: &str,
        registration: &PendingRegistration,
    ) -> HarnessResult<()> {
        let body = json!({
            "id": registration.id,
            "email": registration.email,
            "firstName": registration.forename,
            "lastName": registration.surname,
            "roles": [registration.role],
        });
        check(
            self.http
                .post(self.url("/api/v1/users/registration"))
                .bearer_auth(access_token)
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        debug!("Registered pending user {} with id {}", registration.email, registration.id);
        Ok(())
    }

    async fn delete_test_data(&self, prefix: &str) -> HarnessResult<()> {
        check(
            self.http
                .delete(self.url("/testing-support/test-data"))
                .query(&[("async", "true"), ("testDataPrefix", prefix)])
                .send()
                .await?,
        )
        .await?;
        info!("Requested deletion of test data with prefix {}", prefix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> IdamApiClient {
        IdamApiClient::new(
            &server.url(),
            Some(ApiCredentials {
                username: "admin@mailtest.gov.uk".to_string(),
                password: "Pa55word11".to_string(),
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_user_returns_fixture_with_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/testing-support/accounts")
            .match_body(Matcher::PartialJson(json!({
                "email": "citizen.x@mailtest.gov.uk",
                "roles": [{ "code": "citizen" }],
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"5f6c3a1e-0000-4000-8000-000000000001"}"#)
            .create_async()
            .await;

        let user = client(&server)
            .create_user(&NewUser {
                email: "citizen.x@mailtest.gov.uk".to_string(),
                password: "Passw0rdXyz1".to_string(),
                forename: "lucy".to_string(),
                surname: "lu".to_string(),
                roles: vec!["citizen".to_string()],
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(user.id.as_deref(), Some("5f6c3a1e-0000-4000-8000-000000000001"));
        assert_eq!(user.roles, vec!["citizen".to_string()]);
    }

    #[tokio::test]
    async fn test_rejection_becomes_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/testing-support/services")
            .with_status(409)
            .with_body("service already exists")
            .create_async()
            .await;

        let err = client(&server)
            .create_service(&NewService {
                name: "idamwebtestservice".to_string(),
                redirect_uri: "https://idam.testservice.gov.uk".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        match err {
            HarnessError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "service already exists");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mark_user_stale_looks_up_id_first() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/users")
            .match_query(Matcher::UrlEncoded("email".into(), "stale.x@mailtest.gov.uk".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"abc","email":"stale.x@mailtest.gov.uk","active":true}"#)
            .create_async()
            .await;
        let retire = server
            .mock("POST", "/api/v1/staleUsers/abc/retire")
            .with_status(200)
            .create_async()
            .await;

        client(&server).mark_user_stale("stale.x@mailtest.gov.uk").await.unwrap();

        lookup.assert_async().await;
        retire.assert_async().await;
    }

    #[tokio::test]
    async fn test_authorize_then_exchange() {
        let mut server = mockito::Server::new_async().await;
        let expected_basic = format!("Basic {}", STANDARD.encode("admin@x:secret"));
        server
            .mock("POST", "/oauth2/authorize")
            .match_header("authorization", expected_basic.as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":"the-code"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::UrlEncoded("code".into(), "the-code".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"the-token","token_type":"Bearer"}"#)
            .create_async()
            .await;

        let api = client(&server);
        let code = api
            .authorize_code("svc", "https://idam.testservice.gov.uk", "openid", "admin@x", "secret")
            .await
            .unwrap();
        let token = api
            .exchange_authorization_code(&code, "svc", "https://idam.testservice.gov.uk", "s3cret")
            .await
            .unwrap();
        assert_eq!(token, "the-token");
    }

    #[tokio::test]
    async fn test_delete_test_data_sends_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/testing-support/test-data")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("async".into(), "true".into()),
                Matcher::UrlEncoded("testDataPrefix".into(), "idamwebtestqwerty".into()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        client(&server).delete_test_data("idamwebtestqwerty").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_token_requires_credentials() {
        let server = mockito::Server::new_async().await;
        let api = IdamApiClient::new(&server.url(), None).unwrap();
        assert!(matches!(api.issue_auth_token().await, Err(HarnessError::Config(_))));
    }
}
