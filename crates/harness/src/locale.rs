//! Locale negotiation and the page copy each locale renders
//!
//! Precedence: an explicit query parameter wins and is persisted through the
//! locale cookie (unrecognised values mean English); otherwise a recognised
//! cookie governs; otherwise the best recognised `Accept-Language` entry;
//! otherwise English.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Welsh,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Locale::English => "en",
            Locale::Welsh => "cy",
        }
    }

    /// Parse a language tag such as `cy`, `CY`, `cy-GB` or `en`
    pub fn parse(tag: &str) -> Option<Self> {
        let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Locale::English),
            "cy" => Some(Locale::Welsh),
            _ => None,
        }
    }

    pub fn messages(&self) -> &'static Messages {
        match self {
            Locale::English => &ENGLISH,
            Locale::Welsh => &WELSH,
        }
    }
}

/// Language inputs carried by a single page request
#[derive(Debug, Clone, Copy, Default)]
pub struct LocaleRequest<'a> {
    pub query: Option<&'a str>,
    pub cookie: Option<&'a str>,
    pub accept_language: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub locale: Locale,
    /// Value the response writes into the locale cookie, if any
    pub cookie_update: Option<Locale>,
}

pub fn negotiate(request: LocaleRequest<'_>) -> Negotiation {
    if let Some(query) = request.query {
        let locale = Locale::parse(query).unwrap_or(Locale::English);
        return Negotiation { locale, cookie_update: Some(locale) };
    }

    if let Some(locale) = request.cookie.and_then(Locale::parse) {
        return Negotiation { locale, cookie_update: None };
    }

    let locale = request
        .accept_language
        .and_then(best_accept_language)
        .unwrap_or(Locale::English);
    Negotiation { locale, cookie_update: None }
}

/// Highest weighted recognised entry of an `Accept-Language` header
fn best_accept_language(header: &str) -> Option<Locale> {
    let mut best: Option<(Locale, f32)> = None;

    for entry in header.split(',') {
        let mut parts = entry.split(';');
        let tag = parts.next().unwrap_or_default();
        let weight = parts
            .find_map(|p| p.trim().strip_prefix("q="))
            .and_then(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);

        if let Some(locale) = Locale::parse(tag) {
            if weight > 0.0 && best.map_or(true, |(_, w)| weight > w) {
                best = Some((locale, weight));
            }
        }
    }

    best.map(|(locale, _)| locale)
}

/// Text rendered by the application in one language
#[derive(Debug)]
pub struct Messages {
    pub access_denied: &'static str,
    /// Link that switches the page to the other language
    pub language_switch: &'static str,
    pub create_account_or_sign_in: &'static str,
    pub create_an_account: &'static str,
    pub continue_button: &'static str,
    pub check_your_email: &'static str,
    pub already_have_account_subject: &'static str,
    pub create_a_password: &'static str,
    pub user_activation_title: &'static str,
    pub account_created: &'static str,
    pub can_now_sign_in: &'static str,
    pub account_already_activated: &'static str,
    pub sign_in_or_create_account: &'static str,
    pub sign_in: &'static str,
    pub forgotten_password: &'static str,
    pub reset_your_password: &'static str,
    pub submit_button: &'static str,
    pub create_a_new_password: &'static str,
    pub reset_password_title: &'static str,
    pub password_changed: &'static str,
    pub can_sign_in_with_new_password: &'static str,
    pub password_problem: &'static str,
    pub password_too_easy: &'static str,
    pub password_has_personal_info: &'static str,
    pub password_missing_characters: &'static str,
}

pub static ENGLISH: Messages = Messages {
    access_denied: "Access Denied",
    language_switch: "Cymraeg",
    create_account_or_sign_in: "Create an account or sign in",
    create_an_account: "Create an account",
    continue_button: "Continue",
    check_your_email: "Check your email",
    already_have_account_subject: "You already have an account",
    create_a_password: "Create a password",
    user_activation_title: "User Activation - HMCTS Access",
    account_created: "Account created",
    can_now_sign_in: "You can now sign in to your account.",
    account_already_activated: "Your account is already activated.",
    sign_in_or_create_account: "Sign in or create an account",
    sign_in: "Sign in",
    forgotten_password: "Forgotten password?",
    reset_your_password: "Reset your password",
    submit_button: "Submit",
    create_a_new_password: "Create a new password",
    reset_password_title: "Reset Password - HMCTS Access",
    password_changed: "Your password has been changed",
    can_sign_in_with_new_password: "You can now sign in with your new password.",
    password_problem: "There was a problem with the password you entered",
    password_too_easy: "Your password is too easy to guess",
    password_has_personal_info: "Do not include your name or email in your password",
    password_missing_characters: "Your password didn't have all the required characters",
};

pub static WELSH: Messages = Messages {
    access_denied: "Mynediad wedi'i wrthod",
    language_switch: "English",
    create_account_or_sign_in: "Creu cyfrif neu fewngofnodi",
    create_an_account: "Creu cyfrif",
    continue_button: "Parhau",
    check_your_email: "Gwiriwch eich negeseuon e-bost",
    already_have_account_subject: "Mae gennych gyfrif yn barod",
    create_a_password: "Creu cyfrinair",
    user_activation_title: "Actifadu Defnyddiwr - HMCTS Access",
    account_created: "Cyfrif wedi'i greu",
    can_now_sign_in: "Gallwch nawr fewngofnodi i'ch cyfrif.",
    account_already_activated: "Mae eich cyfrif eisoes wedi'i actifadu.",
    sign_in_or_create_account: "Mewngofnodi neu greu cyfrif",
    sign_in: "Mewngofnodi",
    forgotten_password: "Wedi anghofio eich cyfrinair?",
    reset_your_password: "Ailosod eich cyfrinair",
    submit_button: "Cyflwyno",
    create_a_new_password: "Creu cyfrinair newydd",
    reset_password_title: "Ailosod Cyfrinair - HMCTS Access",
    password_changed: "Mae eich cyfrinair wedi cael ei newid",
    can_sign_in_with_new_password: "Gallwch nawr fewngofnodi gyda'ch cyfrinair newydd.",
    password_problem: "Roedd problem gyda'r cyfrinair a roesoch",
    password_too_easy: "Mae eich cyfrinair yn rhy hawdd i'w ddyfalu",
    password_has_personal_info: "Peidiwch â chynnwys eich enw neu'ch e-bost yn eich cyfrinair",
    password_missing_characters: "Nid oedd eich cyfrinair yn cynnwys yr holl nodau gofynnol",
};
