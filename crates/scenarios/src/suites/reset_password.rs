//! Forgotten password journeys for active, unusual-address and stale citizens

use futures::future::BoxFuture;

use idam_harness::fixtures::{ServiceFixture, TestData};
use idam_harness::{Actor, HarnessResult, Locale, Scenario, Suite, SuiteContext, UserFixture};

use crate::flows::{self, keys};

pub const SUITE_NAME: &str = "I am able to reset my password";

const SPECIAL_CHARACTER_PASSWORD: &str = "New&&&$$$%%%<>234";

pub struct ResetPassword {
    pub data: TestData,
    pub service: ServiceFixture,
    pub first_name: String,
    pub citizen: UserFixture,
    /// Resets with an upper-cased address
    pub mixed_case: UserFixture,
    /// Resets to a password made of repeated special characters
    pub special: UserFixture,
    pub other: UserFixture,
    pub plus: UserFixture,
    pub apostrophe: UserFixture,
    pub stale: UserFixture,
}

fn setup(ctx: SuiteContext) -> BoxFuture<'static, HarnessResult<ResetPassword>> {
    Box::pin(async move {
        let data = ctx.data().clone();
        let first_name = data.user_name();
        let citizen = |email: String, suffix: &'static str| {
            let ctx = ctx.clone();
            let forename = format!("{}{}", first_name, suffix);
            async move { ctx.create_user(&email, &forename, &["citizen"]).await }
        };

        let service = ctx.create_service(vec![], None).await?;
        let active = citizen(data.email("citizen"), "Citizen").await?;
        let mixed_case = citizen(data.email("citizen.case"), "Citizen").await?;
        let special = citizen(data.email("citizen.special"), "Citizen").await?;
        let other = citizen(data.email("other"), "Other").await?;
        let plus = citizen(data.email_with_separator("plus.extra", '+'), "Plus").await?;
        let apostrophe = citizen(data.email_with_separator("apostrophe.o", '\''), "Apostrophe").await?;
        let stale = citizen(data.email("stale"), "Stale").await?;
        ctx.identity().mark_user_stale(&stale.email).await?;

        Ok(ResetPassword {
            data,
            service,
            first_name,
            citizen: active,
            mixed_case,
            special,
            other,
            plus,
            apostrophe,
            stale,
        })
    })
}

fn scenario(title: &str) -> Scenario<ResetPassword> {
    Scenario::new(title)
}

/// Request a reset for `typed`, then read the link sent to `owner`
async fn request_reset(i: &mut Actor, fx: &ResetPassword, typed: &str, owner: &str) -> HarnessResult<()> {
    flows::request_password_reset(i, &fx.service.name, typed).await?;
    let link = i.extract_link_from_email(owner).await?;
    i.capture(keys::RESET_URL, link);
    Ok(())
}

/// Choose `password` on the reset link and sign in with it
async fn reset_and_sign_in(i: &mut Actor, fx: &ResetPassword, email: &str, password: &str) -> HarnessResult<()> {
    let url = i.captured(keys::RESET_URL)?.to_string();
    flows::open_reset_link(i, &url).await?;
    flows::choose_new_password(i, password).await?;
    flows::sign_in_expecting_code(i, &fx.service.name, Some(""), email, password, Locale::English).await
}

/// Reset scenario for one fixture account
fn reset_for(title: &str, account: fn(&ResetPassword) -> &UserFixture) -> Scenario<ResetPassword> {
    scenario(title)
        .step("request a password reset", move |i, fx| {
            Box::pin(async move {
                let email = account(fx).email.clone();
                request_reset(i, fx, &email, &email).await
            })
        })
        .step("reset and sign in", move |i, fx| {
            Box::pin(async move {
                let password = fx.data.password();
                reset_and_sign_in(i, fx, &account(fx).email, &password).await
            })
        })
}

fn reset_with_different_case() -> Scenario<ResetPassword> {
    scenario(
        "@functional @resetpasswithdiffcaseemail As a citizen user I can reset my password with diff case email address",
    )
    .step("request a reset in upper case", |i, fx| {
        Box::pin(async move {
            let email = &fx.mixed_case.email;
            request_reset(i, fx, &email.to_uppercase(), email).await
        })
    })
    .step("reset and sign in", |i, fx| {
        Box::pin(async move {
            let password = fx.data.password();
            reset_and_sign_in(i, fx, &fx.mixed_case.email, &password).await
        })
    })
}

fn password_validation() -> Scenario<ResetPassword> {
    scenario(
        "@functional @resetpass @passwordvalidation Validation displayed when I try to reset my password with a blacklisted/invalid password",
    )
    .retry_configured()
    .step("request a password reset", |i, fx| {
        Box::pin(async move { request_reset(i, fx, &fx.other.email, &fx.other.email).await })
    })
    .step("open the reset link", |i, _| {
        Box::pin(async move {
            let url = i.captured(keys::RESET_URL)?.to_string();
            flows::open_reset_link(i, &url).await
        })
    })
    .step("try rejected passwords", |i, fx| {
        Box::pin(async move { flows::check_password_rules(i, &fx.first_name, &fx.other.email).await })
    })
}

fn special_character_password() -> Scenario<ResetPassword> {
    scenario("@functional @resetpass As a citizen user I can reset my password with repeated special characters")
        .step("request a password reset", |i, fx| {
            Box::pin(async move { request_reset(i, fx, &fx.special.email, &fx.special.email).await })
        })
        .step("reset and sign in", |i, fx| {
            Box::pin(async move { reset_and_sign_in(i, fx, &fx.special.email, SPECIAL_CHARACTER_PASSWORD).await })
        })
}

fn stale_user() -> Scenario<ResetPassword> {
    scenario("@functional @staleuserresetpass As a stale user, I can reset my password")
        .step("request a password reset", |i, fx| {
            Box::pin(async move { request_reset(i, fx, &fx.stale.email, &fx.stale.email).await })
        })
        .step("create a password from the activation page", |i, _| {
            Box::pin(async move {
                let text = Locale::English.messages();
                let url = i.captured(keys::RESET_URL)?.to_string();
                i.navigate(&url).await?;
                i.wait_for_text(text.create_a_password).await?;
                i.see_title_equals(text.user_activation_title).await
            })
        })
        .step("choose a password and sign in", |i, fx| {
            Box::pin(async move {
                let password = fx.data.password();
                flows::choose_new_password(i, &password).await?;
                flows::sign_in_expecting_code(i, &fx.service.name, Some(""), &fx.stale.email, &password, Locale::English)
                    .await
            })
        })
}

pub fn suite() -> Suite<ResetPassword> {
    Suite::new(SUITE_NAME, setup)
        .scenario(reset_for("@functional @resetpass As a citizen user I can reset my password", |fx| {
            &fx.citizen
        }))
        .scenario(reset_with_different_case())
        .scenario(reset_for(
            "@functional @resetpass As a citizen user with a plus email I can reset my password",
            |fx| &fx.plus,
        ))
        .scenario(reset_for(
            "@functional @resetpass As a citizen user with an apostrophe email I can reset my password",
            |fx| &fx.apostrophe,
        ))
        .scenario(password_validation())
        .scenario(special_character_password())
        .scenario(stale_user())
}
