//! Two pending registrations sharing one user id
//!
//! The registration activated first keeps the shared id; the other one is
//! given a generated id when it is activated later.

use futures::future::BoxFuture;
use uuid::Uuid;

use idam_harness::fixtures::{FixtureKind, RoleFixture, ServiceFixture};
use idam_harness::gateway::PendingRegistration;
use idam_harness::{Actor, HarnessError, HarnessResult, Locale, Scenario, Suite, SuiteContext};

use crate::flows::expect_eq;

pub const SUITE_NAME: &str = "user registration with the same uuid in pending status";

const ADMIN_SCOPES: &str = "create-user manage-user";

pub struct PendingUuid {
    pub service: ServiceFixture,
    pub assignable_role: RoleFixture,
    /// Access token of the admin user holding the registration role
    pub access_token: String,
    pub user_id: String,
    pub previous: PendingRegistration,
    pub current: PendingRegistration,
    pub password: String,
}

fn setup(ctx: SuiteContext) -> BoxFuture<'static, HarnessResult<PendingUuid>> {
    Box::pin(async move {
        let data = ctx.data().clone();
        let identity = ctx.identity();
        let redirect_uri = ctx.config().service_redirect_uri.clone();

        let auth_token = identity.issue_auth_token().await?;
        let assignable_role = ctx.create_role("assignable role", None, &auth_token).await?;
        let registration_role = ctx
            .create_role("user reg role", Some(&assignable_role.id), &auth_token)
            .await?;
        let service = ctx
            .create_service(
                vec![assignable_role.id.clone(), registration_role.id.clone()],
                Some(ADMIN_SCOPES),
            )
            .await?;
        let client_secret = service
            .client_secret
            .clone()
            .ok_or_else(|| HarnessError::Setup(format!("service {} has no client secret", service.name)))?;

        let first_name = data.user_name();
        let admin = ctx
            .create_user(&data.email("admin"), &format!("{}Admin", first_name), &[registration_role.name.as_str()])
            .await?;
        let code = identity
            .authorize_code(&service.name, &redirect_uri, ADMIN_SCOPES, &admin.email, &admin.password)
            .await?;
        let access_token = identity
            .exchange_authorization_code(&code, &service.name, &redirect_uri, &client_secret)
            .await?;

        let user_id = Uuid::new_v4().to_string();
        let previous = PendingRegistration {
            id: user_id.clone(),
            email: data.email("user"),
            forename: first_name,
            surname: data.user_name(),
            role: assignable_role.name.clone(),
        };
        let current = PendingRegistration {
            id: user_id.clone(),
            email: data.email("user"),
            forename: data.user_name(),
            surname: data.user_name(),
            role: assignable_role.name.clone(),
        };
        for registration in [&previous, &current] {
            identity.register_user_with_id(&access_token, registration).await?;
            ctx.ledger().record(FixtureKind::User, &registration.email);
        }

        Ok(PendingUuid {
            service,
            assignable_role,
            access_token,
            user_id,
            previous,
            current,
            password: data.password(),
        })
    })
}

/// Set a password through the activation link sent to `email`
async fn activate(i: &Actor, email: &str, password: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    let url = i.extract_link_from_email(email).await?;
    i.navigate(&url).await?;
    i.wait_for_text(text.create_a_password).await?;
    i.fill_field("#password1", password).await?;
    i.fill_field("#password2", password).await?;
    i.click(text.continue_button).await?;
    i.wait_for_text(text.account_created).await
}

fn same_uuid() -> Scenario<PendingUuid> {
    Scenario::<PendingUuid>::new(
        "@functional multiple users can be registered with same uuid but the previous user will be assigned with auto generated uuid upon activation",
    )
    .step("shared id is pending", |i, fx| {
        Box::pin(async move {
            let user = i.identity().get_user_by_id(&fx.user_id, &fx.access_token).await?;
            expect_eq(user.id.as_str(), fx.user_id.as_str(), "id before activation")?;
            expect_eq(user.pending, true, "pending before activation")
        })
    })
    .step("activate the current registration", |i, fx| {
        Box::pin(async move { activate(i, &fx.current.email, &fx.password).await })
    })
    .step("current registration owns the id", |i, fx| {
        Box::pin(async move {
            let user = i.identity().get_user_by_id(&fx.user_id, &fx.access_token).await?;
            expect_eq(user.id.as_str(), fx.user_id.as_str(), "id")?;
            expect_eq(user.active, true, "active")?;
            expect_eq(user.forename.as_str(), fx.current.forename.as_str(), "forename")?;
            expect_eq(user.surname.as_str(), fx.current.surname.as_str(), "surname")?;
            expect_eq(user.email.as_str(), fx.current.email.as_str(), "email")?;
            expect_eq(user.roles, vec![fx.assignable_role.name.clone()], "roles")
        })
    })
    .step("activate the previous registration", |i, fx| {
        Box::pin(async move { activate(i, &fx.previous.email, &fx.password).await })
    })
    .step("previous registration gets a new id", |i, fx| {
        Box::pin(async move {
            let user = i.identity().get_user_by_email(&fx.previous.email).await?;
            if user.id == fx.user_id {
                return Err(HarnessError::assertion(format!(
                    "previous registration {} kept the shared id {}",
                    fx.previous.email, fx.user_id
                )));
            }
            expect_eq(user.active, true, "active")?;
            expect_eq(user.forename.as_str(), fx.previous.forename.as_str(), "forename")?;
            expect_eq(user.surname.as_str(), fx.previous.surname.as_str(), "surname")?;
            expect_eq(user.email.as_str(), fx.previous.email.as_str(), "email")
        })
    })
}

pub fn suite() -> Suite<PendingUuid> {
    Suite::new(SUITE_NAME, setup).scenario(same_uuid())
}
