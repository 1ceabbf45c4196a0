//! One journey through registration, sign in and password reset, run on
//! whichever browser the run is configured for

use futures::future::BoxFuture;

use idam_harness::fixtures::{ServiceFixture, TestData};
use idam_harness::{HarnessResult, Locale, Scenario, Suite, SuiteContext};

use crate::flows::{self, keys};

pub const SUITE_NAME: &str = "Users can create account, sign in and reset password";

const RESET_PASSWORD: &str = "Passw0rd1234";

pub struct CrossBrowser {
    pub data: TestData,
    pub service: ServiceFixture,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn setup(ctx: SuiteContext) -> BoxFuture<'static, HarnessResult<CrossBrowser>> {
    Box::pin(async move {
        let service = ctx.create_service(vec![], None).await?;
        let data = ctx.data().clone();
        Ok(CrossBrowser {
            first_name: data.user_name(),
            last_name: data.user_name(),
            password: data.password(),
            data,
            service,
        })
    })
}

fn journey() -> Scenario<CrossBrowser> {
    Scenario::<CrossBrowser>::new("@crossbrowser Idam Web public cross browser tests")
        .step("create an account", |i, fx| {
            Box::pin(async move {
                let email = fx.data.email("citizen");
                flows::register_new_citizen(i, &fx.service.name, email, &fx.first_name, &fx.last_name, Locale::English)
                    .await?;
                let url = i.captured(keys::ACTIVATION_URL)?.to_string();
                flows::activate_account(i, &url, &fx.password, Locale::English).await
            })
        })
        .step("sign in", |i, fx| {
            Box::pin(async move {
                let text = Locale::English.messages();
                let email = i.captured(keys::EMAIL)?.to_string();
                i.navigate(&i.urls().login(&fx.service.name, None)).await?;
                i.wait_for_text(text.sign_in).await?;
                i.fill_field("#username", &email).await?;
                i.fill_field("#password", &fx.password).await?;
                i.click(text.sign_in).await?;
                i.dont_see(text.sign_in_or_create_account).await
            })
        })
        .step("reset the password", |i, fx| {
            Box::pin(async move {
                let email = i.captured(keys::EMAIL)?.to_string();
                flows::request_password_reset(i, &fx.service.name, &email).await?;
                let link = i.extract_link_from_email(&email).await?;
                flows::open_reset_link(i, &link).await?;
                flows::choose_new_password(i, RESET_PASSWORD).await
            })
        })
}

pub fn suite() -> Suite<CrossBrowser> {
    Suite::new(SUITE_NAME, setup).scenario(journey())
}
