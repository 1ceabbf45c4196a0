//! Journeys shared by several suites
//!
//! Each flow drives one page sequence of the application and fails on the
//! first text, title or URL that does not match.

use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, warn};

use idam_harness::locale::{Locale, Messages};
use idam_harness::urls::RedirectOutcome;
use idam_harness::{Actor, HarnessError, HarnessResult};

/// Artifact keys shared between steps of one attempt
pub mod keys {
    pub const EMAIL: &str = "email";
    pub const ACTIVATION_URL: &str = "activation_url";
    pub const RESET_URL: &str = "reset_url";
}

const URL_TIMEOUT: Duration = Duration::from_secs(30);

pub fn expect_eq<T: PartialEq + Debug>(actual: T, expected: T, what: &str) -> HarnessResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "{}: expected {:?}, got {:?}",
            what, expected, actual
        )))
    }
}

/// Land on the self-registration form in `locale`
pub async fn open_self_registration(i: &Actor, service: &str, locale: Option<Locale>) -> HarnessResult<()> {
    let url = i.urls().self_register(service);
    let url = match locale {
        Some(locale) => i.urls().force_locale(&url, locale),
        None => url,
    };
    let text = locale.unwrap_or_default().messages();

    i.navigate(&url).await?;
    i.wait_url_contains("users/selfRegister", URL_TIMEOUT).await?;
    i.wait_for_text(text.create_account_or_sign_in).await?;
    i.see(text.create_an_account).await
}

/// Fill and submit the registration form, ending on "Check your email"
pub async fn submit_registration(
    i: &Actor,
    first_name: &str,
    last_name: &str,
    email: &str,
    locale: Locale,
) -> HarnessResult<()> {
    let text = locale.messages();
    i.fill_field("firstName", first_name).await?;
    i.fill_field("lastName", last_name).await?;
    i.fill_field("email", email).await?;
    i.click(text.continue_button).await?;
    i.wait_for_text(text.check_your_email).await
}

/// Register a fresh address and keep it and its activation link as artifacts
pub async fn register_new_citizen(
    i: &mut Actor,
    service: &str,
    email: String,
    first_name: &str,
    last_name: &str,
    locale: Locale,
) -> HarnessResult<()> {
    let forced = (locale == Locale::Welsh).then_some(locale);
    open_self_registration(i, service, forced).await?;
    submit_registration(i, first_name, last_name, &email, locale).await?;
    let link = i.extract_link_from_email(&email).await?;
    debug!("[{}] activation link received for {}", i.session_id(), email);
    i.capture(keys::EMAIL, email);
    i.capture(keys::ACTIVATION_URL, link);
    Ok(())
}

/// Set the first password through an activation link
pub async fn activate_account(i: &Actor, activation_url: &str, password: &str, locale: Locale) -> HarnessResult<()> {
    let text = locale.messages();
    i.navigate(activation_url).await?;
    i.wait_for_text(text.create_a_password).await?;
    i.see_title_equals(text.user_activation_title).await?;
    i.fill_field("#password1", password).await?;
    i.fill_field("#password2", password).await?;
    i.click(text.continue_button).await?;
    i.wait_for_text(text.account_created).await?;
    i.see(text.can_now_sign_in).await
}

/// Sign in and check the service received an authorization code
pub async fn sign_in_expecting_code(
    i: &Actor,
    service: &str,
    state: Option<&str>,
    email: &str,
    password: &str,
    locale: Locale,
) -> HarnessResult<()> {
    let text = locale.messages();
    i.navigate(&i.urls().login(service, state)).await?;
    if let Some(state) = state {
        i.see_in_current_url(&format!("state={}", state)).await?;
    }
    i.wait_for_text(text.sign_in_or_create_account).await?;
    i.fill_field("#username", email).await?;
    i.fill_field("#password", password).await?;

    let interception = i.intercept_requests_after_signin().await?;
    i.click(text.sign_in).await?;
    i.wait_for_text(i.urls().service_redirect_uri()).await?;
    i.see("code=").await?;
    i.dont_see("error=").await?;

    let outcome = RedirectOutcome::parse(&i.grab_current_url().await?)?;
    expect_eq(outcome.is_authorized(), true, "authorized redirect")?;
    if let Some(state) = state.filter(|s| !s.is_empty()) {
        expect_eq(outcome.state.as_deref(), Some(state), "returned state")?;
    }
    interception.release().await
}

/// Ask for a reset link from the login page
pub async fn request_password_reset(i: &Actor, service: &str, email: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    i.navigate(&i.urls().login(service, Some(""))).await?;
    i.wait_for_text(text.sign_in_or_create_account).await?;
    i.click(text.forgotten_password).await?;
    i.wait_for_text(text.reset_your_password).await?;
    i.fill_field("#email", email).await?;
    i.click(text.submit_button).await?;
    i.wait_for_text(text.check_your_email).await
}

/// Open the reset link and land on the new password form
pub async fn open_reset_link(i: &Actor, reset_url: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    i.navigate(reset_url).await?;
    i.wait_for_text(text.create_a_new_password).await?;
    i.see_title_equals(text.reset_password_title).await
}

/// Submit a new password on the current reset or activation form
pub async fn choose_new_password(i: &Actor, password: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    i.fill_field("#password1", password).await?;
    i.fill_field("#password2", password).await?;
    i.click(text.continue_button).await?;
    if let Err(e) = i.wait_for_text(text.password_changed).await {
        return Err(password_rejection(i, text).await.unwrap_or(e));
    }
    i.see(text.can_sign_in_with_new_password).await
}

/// The password rule the application reported, if the form was rejected
async fn password_rejection(i: &Actor, text: &Messages) -> Option<HarnessError> {
    i.see(text.password_problem).await.ok()?;
    for rule in [
        text.password_too_easy,
        text.password_has_personal_info,
        text.password_missing_characters,
    ] {
        if i.see(rule).await.is_ok() {
            return Some(HarnessError::Validation(rule.to_string()));
        }
    }
    Some(HarnessError::Validation(text.password_problem.to_string()))
}

async fn rejected_password(i: &Actor, password: &str, expected: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    i.fill_field("password1", password).await?;
    i.fill_field("password2", password).await?;
    i.click(text.continue_button).await?;
    i.wait_for_text(text.password_problem).await?;
    i.see(expected).await
}

/// Close sibling browser contexts, logging the ones that fail to close
pub async fn close_tabs(tabs: &[&Actor]) {
    for tab in tabs {
        if let Err(e) = tab.close().await {
            warn!("Failed to close session {}: {}", tab.session_id(), e);
        }
    }
}

/// Walk the password rules on a password form that is already open
pub async fn check_password_rules(i: &Actor, first_name: &str, email: &str) -> HarnessResult<()> {
    let text = Locale::English.messages();
    rejected_password(i, "Passw0rd", text.password_too_easy).await?;
    rejected_password(i, &format!("{}Other6mKjmC", first_name), text.password_has_personal_info).await?;
    rejected_password(i, &format!("{}3ksTys", email), text.password_has_personal_info).await?;
    rejected_password(i, "passwordidamtest", text.password_missing_characters).await?;
    rejected_password(i, "Lincoln1", text.password_too_easy).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_eq() {
        expect_eq("a", "a", "same").unwrap();
        let err = expect_eq(true, false, "pending").unwrap_err();
        assert_eq!(err.to_string(), "Assertion failed: pending: expected false, got true");
    }
}
