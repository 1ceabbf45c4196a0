//! Locale selection through the switch link, cookie, header and query parameter

use futures::future::BoxFuture;
use std::time::Duration;

use idam_harness::fixtures::ServiceFixture;
use idam_harness::locale::{negotiate, LocaleRequest};
use idam_harness::{Actor, HarnessResult, Locale, Scenario, Suite, SuiteContext, UserFixture};

use crate::flows::{self, keys};

pub const SUITE_NAME: &str = "Welsh Language";

const SPECIAL_CHARACTER_PASSWORD: &str = "New%%%&&&234";
const INVALID_LANGUAGE: &str = "invalid";

pub struct WelshLanguage {
    pub service: ServiceFixture,
    pub citizen: UserFixture,
}

fn setup(ctx: SuiteContext) -> BoxFuture<'static, HarnessResult<WelshLanguage>> {
    Box::pin(async move {
        let service = ctx.create_service(vec![], None).await?;
        let citizen = ctx.create_citizen("citizen").await?;
        Ok(WelshLanguage { service, citizen })
    })
}

fn scenario(title: &str) -> Scenario<WelshLanguage> {
    Scenario::new(title)
}

/// Start on the probe page without a locale cookie
fn reset_locale<'a>(i: &'a mut Actor, _: &'a WelshLanguage) -> BoxFuture<'a, HarnessResult<()>> {
    Box::pin(async move {
        i.navigate(&i.urls().probe_page()).await?;
        i.clear_cookie(&i.config().locale.cookie_name).await
    })
}

/// Wait for the probe page copy of whichever locale `request` selects
///
/// The cookie is only checked for recognised parameters.
async fn expect_probe_in(i: &Actor, request: LocaleRequest<'_>) -> HarnessResult<()> {
    let negotiated = negotiate(request);
    i.wait_for_text(negotiated.locale.messages().access_denied).await?;

    let recognised = request.query.and_then(Locale::parse).is_some();
    if let (true, Some(persisted)) = (recognised, negotiated.cookie_update) {
        i.see_cookie(&i.config().locale.cookie_name, persisted.code()).await?;
    }
    Ok(())
}

fn language_switch() -> Scenario<WelshLanguage> {
    scenario("@functional @welshLanguage There is a language switch that is working")
        .step("open the page in English", |i, _| {
            Box::pin(async move {
                let english = Locale::English.messages();
                i.navigate(&i.urls().with_language(&i.urls().probe_page(), Locale::English.code()))
                    .await?;
                i.wait_for_text(english.access_denied).await?;
                i.wait_for_text(english.language_switch).await
            })
        })
        .step("switch to Welsh", |i, _| {
            Box::pin(async move {
                let welsh = Locale::Welsh.messages();
                i.click(Locale::English.messages().language_switch).await?;
                i.wait_for_text(welsh.access_denied).await?;
                i.wait_for_text(welsh.language_switch).await
            })
        })
        .step("switch back to English", |i, _| {
            Box::pin(async move {
                i.click(Locale::Welsh.messages().language_switch).await?;
                i.wait_for_text(Locale::English.messages().language_switch).await
            })
        })
}

fn language_from_cookie() -> Scenario<WelshLanguage> {
    scenario("@functional @welshLanguage I can set the language with a cookie")
        .step("set the locale cookie", |i, _| {
            Box::pin(async move {
                let probe = i.urls().probe_page();
                i.navigate(&probe).await?;
                i.set_cookie(&i.config().locale.cookie_name, Locale::Welsh.code()).await?;
                i.navigate(&probe).await?;
                expect_probe_in(
                    i,
                    LocaleRequest {
                        cookie: Some(Locale::Welsh.code()),
                        ..Default::default()
                    },
                )
                .await
            })
        })
}

// TODO: tag functional once Accept-Language negotiation is fixed in the web app
fn language_from_header() -> Scenario<WelshLanguage> {
    scenario("@welshLanguage I can set the language with a header")
        .step("reset the locale", reset_locale)
        .step("send an Accept-Language header", |i, _| {
            Box::pin(async move {
                i.set_request_headers(&[("Accept-Language", Locale::Welsh.code())]).await?;
                i.navigate(&i.urls().probe_page()).await?;
                expect_probe_in(
                    i,
                    LocaleRequest {
                        accept_language: Some(Locale::Welsh.code()),
                        ..Default::default()
                    },
                )
                .await
            })
        })
}

fn language_from_parameter() -> Scenario<WelshLanguage> {
    scenario("@functional @welshLanguage I can set the language with a parameter")
        .step("reset the locale", reset_locale)
        .step("force Welsh with the parameter", |i, _| {
            Box::pin(async move {
                i.navigate(&i.urls().force_locale(&i.urls().probe_page(), Locale::Welsh))
                    .await?;
                expect_probe_in(
                    i,
                    LocaleRequest {
                        query: Some(Locale::Welsh.code()),
                        ..Default::default()
                    },
                )
                .await
            })
        })
}

fn parameter_overrides_cookie() -> Scenario<WelshLanguage> {
    scenario("@functional @welshLanguage The language parameter overrides the cookie")
        .step("set an English cookie", |i, _| {
            Box::pin(async move {
                i.navigate(&i.urls().probe_page()).await?;
                i.set_cookie(&i.config().locale.cookie_name, Locale::English.code()).await
            })
        })
        .step("force Welsh with the parameter", |i, _| {
            Box::pin(async move {
                i.navigate(&i.urls().force_locale(&i.urls().probe_page(), Locale::Welsh))
                    .await?;
                expect_probe_in(
                    i,
                    LocaleRequest {
                        query: Some(Locale::Welsh.code()),
                        cookie: Some(Locale::English.code()),
                        ..Default::default()
                    },
                )
                .await
            })
        })
}

fn invalid_parameter() -> Scenario<WelshLanguage> {
    scenario("@functional @welshLanguage I can set the language to English with an invalid parameter")
        .step("reset the locale", reset_locale)
        .step("send an unknown language", |i, _| {
            Box::pin(async move {
                i.navigate(&i.urls().with_language(&i.urls().probe_page(), INVALID_LANGUAGE))
                    .await?;
                expect_probe_in(
                    i,
                    LocaleRequest {
                        query: Some(INVALID_LANGUAGE),
                        ..Default::default()
                    },
                )
                .await
            })
        })
}

fn reset_password_in_welsh() -> Scenario<WelshLanguage> {
    scenario("@functional @welshLanguage I can reset my password in Welsh")
        .step("request a reset in Welsh", |i, fx| {
            Box::pin(async move {
                let welsh = Locale::Welsh.messages();
                let login = i.urls().login(&fx.service.name, None);
                i.navigate(&i.urls().force_locale(&login, Locale::Welsh)).await?;
                i.wait_for_text(welsh.sign_in_or_create_account).await?;
                i.see(welsh.forgotten_password).await?;
                i.click(welsh.forgotten_password).await?;
                i.wait_url_contains("reset/forgotpassword", Duration::from_secs(30)).await?;
                i.wait_for_text(welsh.reset_your_password).await?;
                i.fill_field("#email", &fx.citizen.email).await?;
                i.click(welsh.submit_button).await?;
                i.wait_for_text(welsh.check_your_email).await?;

                let link = i.extract_link_from_email(&fx.citizen.email).await?;
                i.capture(keys::RESET_URL, link);
                Ok(())
            })
        })
        .step("choose a new password in Welsh", |i, _| {
            Box::pin(async move {
                let welsh = Locale::Welsh.messages();
                let url = i.captured(keys::RESET_URL)?.to_string();
                i.navigate(&url).await?;
                i.wait_for_text(welsh.create_a_new_password).await?;
                i.fill_field("#password1", SPECIAL_CHARACTER_PASSWORD).await?;
                i.fill_field("#password2", SPECIAL_CHARACTER_PASSWORD).await?;
                i.click(welsh.continue_button).await?;
                i.wait_url_contains("doResetPassword", Duration::from_secs(30)).await?;
                i.wait_for_text(welsh.password_changed).await
            })
        })
        .step("sign in with the new password", |i, fx| {
            Box::pin(async move {
                flows::sign_in_expecting_code(
                    i,
                    &fx.service.name,
                    None,
                    &fx.citizen.email,
                    SPECIAL_CHARACTER_PASSWORD,
                    Locale::Welsh,
                )
                .await
            })
        })
}

pub fn suite() -> Suite<WelshLanguage> {
    Suite::new(SUITE_NAME, setup)
        .scenario(language_switch())
        .scenario(language_from_cookie())
        .scenario(language_from_header())
        .scenario(language_from_parameter())
        .scenario(parameter_overrides_cookie())
        .scenario(invalid_parameter())
        .scenario(reset_password_in_welsh())
}
