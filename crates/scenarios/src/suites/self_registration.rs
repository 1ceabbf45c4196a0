//! Self registration: form validation, activation and first sign in

use futures::future::BoxFuture;
use std::time::Duration;

use idam_harness::fixtures::{ServiceFixture, TestData};
use idam_harness::urls::RegistrationDetails;
use idam_harness::{Actor, HarnessResult, Locale, Scenario, Suite, SuiteContext, UserFixture};

use crate::flows::{self, expect_eq, keys};

pub const SUITE_NAME: &str = "Self Registration";

const SPECIAL_CHARACTER_PASSWORD: &str = "New%%%&&&234";
const ACCOUNT_EXISTS_SUBJECT: &str = "You already have an account";

const INFORMATION_MISSING: &str = "Information is missing or invalid";
const MISSING_FIRST_NAME: &str = "You have not entered your first name";
const MISSING_LAST_NAME: &str = "You have not entered your last name";
const MISSING_EMAIL: &str = "You have not entered your email address";
const INVALID_EMAIL: &str = "Your email address is invalid";
const INVALID_FIRST_NAME: &str = "Your first name is invalid";
const INVALID_LAST_NAME: &str = "Your last name is invalid";
const FIRST_NAME_RULE: &str =
    "First name has to be longer than 1 character and should not include digits nor any of these characters:";
const LAST_NAME_RULE: &str =
    "Last name has to be longer than 1 character and should not include digits nor any of these characters:";
const BACK_TO_SIGN_IN: &str = "Sign in to your account.";

pub struct SelfRegistration {
    pub data: TestData,
    pub service: ServiceFixture,
    pub citizen: UserFixture,
    pub welsh_citizen: UserFixture,
    pub stale: UserFixture,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn setup(ctx: SuiteContext) -> BoxFuture<'static, HarnessResult<SelfRegistration>> {
    Box::pin(async move {
        let service = ctx.create_service(vec![], None).await?;
        let citizen = ctx.create_citizen("citizen").await?;
        let welsh_citizen = ctx.create_citizen("citizen.cy").await?;
        let stale = ctx.create_stale_citizen("stale").await?;
        let data = ctx.data().clone();

        Ok(SelfRegistration {
            first_name: data.user_name(),
            last_name: data.user_name(),
            password: data.password(),
            data,
            service,
            citizen,
            welsh_citizen,
            stale,
        })
    })
}

fn scenario(title: &str) -> Scenario<SelfRegistration> {
    Scenario::new(title)
}

fn open_form<'a>(i: &'a mut Actor, fx: &'a SelfRegistration) -> BoxFuture<'a, HarnessResult<()>> {
    Box::pin(async move {
        i.clear_cookie(&i.config().locale.cookie_name).await?;
        flows::open_self_registration(i, &fx.service.name, None).await
    })
}

fn register_in_english<'a>(i: &'a mut Actor, fx: &'a SelfRegistration) -> BoxFuture<'a, HarnessResult<()>> {
    Box::pin(async move {
        let email = fx.data.email("test_citizen");
        flows::register_new_citizen(i, &fx.service.name, email, &fx.first_name, &fx.last_name, Locale::English)
            .await
    })
}

fn activate_with_password<'a>(i: &'a mut Actor, fx: &'a SelfRegistration) -> BoxFuture<'a, HarnessResult<()>> {
    Box::pin(async move {
        let url = i.captured(keys::ACTIVATION_URL)?.to_string();
        flows::activate_account(i, &url, &fx.password, Locale::English).await
    })
}

fn sign_in_with_password<'a>(i: &'a mut Actor, fx: &'a SelfRegistration) -> BoxFuture<'a, HarnessResult<()>> {
    Box::pin(async move {
        let email = i.captured(keys::EMAIL)?.to_string();
        flows::sign_in_expecting_code(i, &fx.service.name, Some("selfreg"), &email, &fx.password, Locale::English)
            .await
    })
}

/// Submit an already known address and check which email went out
async fn register_existing(
    i: &Actor,
    fx: &SelfRegistration,
    email: &str,
    locale: Locale,
    expected_subject: &str,
) -> HarnessResult<()> {
    flows::submit_registration(i, &fx.first_name, &fx.last_name, email, locale).await?;
    let message = i.fetch_email_for_address(email).await?;
    expect_eq(message.subject.as_str(), expected_subject, "email subject")
}

fn validation_errors() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister User Validation errors")
        .retry_configured()
        .step("open self registration", |i, fx| {
            Box::pin(async move { flows::open_self_registration(i, &fx.service.name, None).await })
        })
        .step("submit an empty form", |i, _| {
            Box::pin(async move {
                i.click(Locale::English.messages().continue_button).await?;
                i.wait_for_text(INFORMATION_MISSING).await?;
                i.see(MISSING_FIRST_NAME).await?;
                i.see(MISSING_LAST_NAME).await?;
                i.see(MISSING_EMAIL).await
            })
        })
        .step("fill the first name", |i, _| {
            Box::pin(async move {
                i.fill_field("firstName", "Lucy").await?;
                i.click(Locale::English.messages().continue_button).await?;
                i.dont_see(MISSING_FIRST_NAME).await?;
                i.see(MISSING_LAST_NAME).await?;
                i.see(MISSING_EMAIL).await
            })
        })
        .step("fill the last name", |i, _| {
            Box::pin(async move {
                i.fill_field("lastName", "Lu").await?;
                i.click(Locale::English.messages().continue_button).await?;
                i.dont_see(MISSING_FIRST_NAME).await?;
                i.dont_see(MISSING_LAST_NAME).await?;
                i.see(MISSING_EMAIL).await
            })
        })
        .step("enter an invalid email", |i, _| {
            Box::pin(async move {
                i.fill_field("email", "111").await?;
                i.click(Locale::English.messages().continue_button).await?;
                i.see(INVALID_EMAIL).await
            })
        })
        .step("enter invalid names", |i, _| {
            Box::pin(async move {
                i.fill_field("firstName", "L").await?;
                i.fill_field("lastName", "@@").await?;
                i.click(Locale::English.messages().continue_button).await?;
                i.see(INVALID_FIRST_NAME).await?;
                i.see(FIRST_NAME_RULE).await?;
                i.see(INVALID_LAST_NAME).await?;
                i.see(LAST_NAME_RULE).await
            })
        })
        .step("go back to sign in", |i, _| {
            Box::pin(async move {
                i.see(BACK_TO_SIGN_IN).await?;
                i.click(BACK_TO_SIGN_IN).await?;
                i.wait_for_text(Locale::English.messages().sign_in).await?;
                i.see(Locale::English.messages().sign_in).await
            })
        })
}

fn account_already_created() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister @welshLanguage Account already created (no language)")
        .step("open self registration", open_form)
        .step("register the existing citizen", |i, fx| {
            Box::pin(async move {
                register_existing(i, fx, &fx.citizen.email, Locale::English, ACCOUNT_EXISTS_SUBJECT).await
            })
        })
}

fn account_already_created_in_welsh() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister @welshLanguage Account already created (force Welsh)")
        .step("open self registration in Welsh", |i, fx| {
            Box::pin(async move {
                let cookie = i.config().locale.cookie_name.clone();
                i.clear_cookie(&cookie).await?;
                flows::open_self_registration(i, &fx.service.name, Some(Locale::Welsh)).await?;
                i.see_cookie(&cookie, Locale::Welsh.code()).await
            })
        })
        .step("register the existing citizen", |i, fx| {
            Box::pin(async move {
                let subject = Locale::Welsh.messages().already_have_account_subject;
                register_existing(i, fx, &fx.welsh_citizen.email, Locale::Welsh, subject).await
            })
        })
}

fn self_register() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister @welshLanguage I can self register (no language)")
        .step("register a new citizen", |i, fx| {
            Box::pin(async move {
                i.clear_cookie(&i.config().locale.cookie_name).await?;
                register_in_english(i, fx).await
            })
        })
        .step("activate the account", activate_with_password)
        .step("sign in to the service", sign_in_with_password)
}

fn self_register_in_welsh() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister @welshLanguage I can self register (Welsh)")
        .step("register a new citizen in Welsh", |i, fx| {
            Box::pin(async move {
                let email = fx.data.email("test_citizen");
                flows::register_new_citizen(i, &fx.service.name, email, &fx.first_name, &fx.last_name, Locale::Welsh)
                    .await
            })
        })
        .step("activate the account in Welsh", |i, fx| {
            Box::pin(async move {
                let url = i.captured(keys::ACTIVATION_URL)?.to_string();
                flows::activate_account(i, &url, &fx.password, Locale::Welsh).await
            })
        })
        .step("sign in to the service in Welsh", |i, fx| {
            Box::pin(async move {
                let email = i.captured(keys::EMAIL)?.to_string();
                flows::sign_in_expecting_code(i, &fx.service.name, Some("selfreg"), &email, &fx.password, Locale::Welsh)
                    .await
            })
        })
}

fn activation_link_single_use() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister I can self register and cannot use activation link again")
        .step("register a new citizen", register_in_english)
        .step("activate the account", activate_with_password)
        .step("reuse the activation link", |i, _| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                let url = i.captured(keys::ACTIVATION_URL)?.to_string();
                i.navigate(&url).await?;
                i.wait_for_text(Locale::English.messages().account_already_activated).await
            })
        })
}

fn prepopulated_form() -> Scenario<SelfRegistration> {
    scenario(
        "@functional @selfregister @prePopulatedScreen I can self register with pre-populated user account screen",
    )
    .step("open the pre-populated form", |i, fx| {
        Box::pin(async move {
            let details = RegistrationDetails {
                first_name: fx.first_name.clone(),
                last_name: fx.last_name.clone(),
                email: fx.data.email("citizen"),
            };
            let url = i.urls().self_register_prefilled(&fx.service.name, &details)?;
            let text = Locale::English.messages();

            i.navigate(&url).await?;
            i.wait_url_contains("users/selfRegister", Duration::from_secs(30)).await?;
            i.wait_for_text(text.create_account_or_sign_in).await?;
            i.see(text.create_an_account).await?;
            i.see_in_field("firstName", &details.first_name).await?;
            i.see_in_field("lastName", &details.last_name).await?;
            i.see_in_field("email", &details.email).await?;
            i.capture(keys::EMAIL, details.email);
            Ok(())
        })
    })
    .step("submit the form", |i, _| {
        Box::pin(async move {
            let text = Locale::English.messages();
            i.click(text.continue_button).await?;
            i.wait_for_text(text.check_your_email).await?;
            let email = i.captured(keys::EMAIL)?.to_string();
            let link = i.extract_link_from_email(&email).await?;
            i.capture(keys::ACTIVATION_URL, link);
            Ok(())
        })
    })
    .step("activate the account", activate_with_password)
    .step("sign in to the service", sign_in_with_password)
}

fn special_character_password() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister I can self register with repeated special characters in password")
        .step("register a new citizen", register_in_english)
        .step("activate with special characters", |i, _| {
            Box::pin(async move {
                let url = i.captured(keys::ACTIVATION_URL)?.to_string();
                flows::activate_account(i, &url, SPECIAL_CHARACTER_PASSWORD, Locale::English).await
            })
        })
        .step("sign in with special characters", |i, fx| {
            Box::pin(async move {
                let email = i.captured(keys::EMAIL)?.to_string();
                flows::sign_in_expecting_code(
                    i,
                    &fx.service.name,
                    Some("selfreg"),
                    &email,
                    SPECIAL_CHARACTER_PASSWORD,
                    Locale::English,
                )
                .await
            })
        })
}

fn password_validation() -> Scenario<SelfRegistration> {
    scenario(
        "@functional @selfregister @passwordvalidation Validation displayed when I try to create my password with a blacklisted/invalid password",
    )
    .retry_configured()
    .step("register a new citizen", |i, fx| {
        Box::pin(async move {
            let email = fx.data.email("test_citizen2");
            flows::register_new_citizen(i, &fx.service.name, email, &fx.first_name, &fx.last_name, Locale::English)
                .await
        })
    })
    .step("open the activation link", |i, _| {
        Box::pin(async move {
            let text = Locale::English.messages();
            let url = i.captured(keys::ACTIVATION_URL)?.to_string();
            i.navigate(&url).await?;
            i.wait_for_text(text.create_a_password).await?;
            i.see_title_equals(text.user_activation_title).await
        })
    })
    .step("try rejected passwords", |i, fx| {
        Box::pin(async move {
            let email = i.captured(keys::EMAIL)?.to_string();
            flows::check_password_rules(i, &fx.first_name, &email).await
        })
    })
}

fn stale_user() -> Scenario<SelfRegistration> {
    scenario("@functional @selfregister @staleuserregister stale user should get you already have an account email")
        .step("open self registration", |i, fx| {
            Box::pin(async move { flows::open_self_registration(i, &fx.service.name, None).await })
        })
        .step("register the stale citizen", |i, fx| {
            Box::pin(async move {
                register_existing(i, fx, &fx.stale.email, Locale::English, ACCOUNT_EXISTS_SUBJECT).await
            })
        })
}

/// Fill and submit the activation form in a sibling context
async fn activate_in(actor: &Actor, password: &str) -> HarnessResult<String> {
    actor.type_text("#password1", password).await?;
    actor.type_text("#password2", password).await?;
    actor.click("#activate").await?;
    actor.grab_text_from("h1.heading-large").await
}

async fn race_activation(first: &Actor, second: &Actor, url: &str, password: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    for tab in [first, second] {
        tab.navigate(url).await?;
        tab.wait_for_text_within(text.create_a_password, tab.config().wait_timeout(), Some("h1"))
            .await?;
    }

    let heading = activate_in(second, password).await?;
    expect_eq(heading.trim(), text.account_created, "second tab heading")?;

    let heading = activate_in(first, password).await?;
    expect_eq(heading.trim(), text.account_already_activated, "first tab heading")
}

fn activation_in_two_tabs() -> Scenario<SelfRegistration> {
    scenario(
        "@functional @selfregister I can create a password only once using the activation link opened in multiple tabs",
    )
    .step("register a new citizen", register_in_english)
    .step("activate from two tabs", |i, fx| {
        Box::pin(async move {
            let url = i.captured(keys::ACTIVATION_URL)?.to_string();
            let first = i.open_new_browser_context().await?;
            let second = match i.open_new_browser_context().await {
                Ok(second) => second,
                Err(e) => {
                    flows::close_tabs(&[&first]).await;
                    return Err(e);
                }
            };

            let outcome = race_activation(&first, &second, &url, &fx.password).await;
            flows::close_tabs(&[&second, &first]).await;
            outcome
        })
    })
}

pub fn suite() -> Suite<SelfRegistration> {
    Suite::new(SUITE_NAME, setup)
        .scenario(validation_errors())
        .scenario(account_already_created())
        .scenario(account_already_created_in_welsh())
        .scenario(self_register())
        .scenario(self_register_in_welsh())
        .scenario(activation_link_single_use())
        .scenario(prepopulated_form())
        .scenario(special_character_password())
        .scenario(password_validation())
        .scenario(stale_user())
        .scenario(activation_in_two_tabs())
}
