//! Fixture naming and bookkeeping
//!
//! Every service, role and user created by a run carries the run prefix so
//! that teardown can bulk-delete exactly what the run created. Names are
//! letters only because the application rejects digits in person names.

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the random part appended to the configured base prefix
pub const RUN_SUFFIX_LEN: usize = 6;

/// Generator for prefixed fixture names, emails and secrets
#[derive(Debug, Clone)]
pub struct TestData {
    prefix: String,
    email_domain: String,
}

impl TestData {
    /// Create a generator with a fresh run prefix derived from `base`
    pub fn new(base: &str, email_domain: &str) -> Self {
        let prefix = format!("{}{}", base, random_letters(RUN_SUFFIX_LEN));
        Self::with_prefix(prefix, email_domain)
    }

    pub fn with_prefix(prefix: impl Into<String>, email_domain: &str) -> Self {
        Self {
            prefix: prefix.into(),
            email_domain: email_domain.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn service_name(&self) -> String {
        format!("{}service{}", self.prefix, random_letters(8))
    }

    pub fn role_name(&self) -> String {
        format!("{}role{}", self.prefix, random_letters(8))
    }

    /// A person name that passes the application's name rules
    pub fn user_name(&self) -> String {
        format!("{}{}", self.prefix, random_letters(8))
    }

    /// `{label}.{prefix}{random}@{domain}`
    pub fn email(&self, label: &str) -> String {
        self.email_with_separator(label, '.')
    }

    /// `{label}{separator}{prefix}{random}@{domain}`, e.g. plus addressing
    pub fn email_with_separator(&self, label: &str, separator: char) -> String {
        format!(
            "{}{}{}{}@{}",
            label,
            separator,
            self.prefix,
            random_alphanumeric(10).to_lowercase(),
            self.email_domain
        )
    }

    pub fn client_secret(&self) -> String {
        random_alphanumeric(24)
    }

    /// A password carrying every required character class and no fixture name
    pub fn password(&self) -> String {
        let mut rng = rand::thread_rng();
        let upper = rng.gen_range(b'A'..=b'Z') as char;
        let lower = rng.gen_range(b'a'..=b'z') as char;
        let digit = rng.gen_range(b'0'..=b'9') as char;
        format!("{}{}{}{}", upper, random_alphanumeric(12), lower, digit)
    }

    /// Whether a generated identifier belongs to this run
    pub fn owns(&self, identifier: &str) -> bool {
        tagged_segment(identifier).starts_with(&self.prefix)
    }
}

/// The part of an identifier that carries the run prefix
///
/// Emails carry it after the last `.`, `+` or `'` of the local part; names
/// carry it at the start.
fn tagged_segment(identifier: &str) -> &str {
    match identifier.split_once('@') {
        Some((local, _)) => local
            .rsplit(|c| c == '.' || c == '+' || c == '\'')
            .next()
            .unwrap_or(local),
        None => identifier,
    }
}

pub fn random_letters(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    Service,
    Role,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceFixture {
    pub name: String,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub role_ids: Vec<String>,
    /// Space separated OAuth scopes granted to the service
    pub scopes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFixture {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parent_role_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFixture {
    pub id: Option<String>,
    pub email: String,
    pub password: String,
    pub forename: String,
    pub surname: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// One entry in the fixture ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub kind: FixtureKind,
    /// Service name, role name or user email
    pub key: String,
}

/// Everything a suite created, kept for teardown logging and ownership checks
#[derive(Debug, Default)]
pub struct FixtureLedger {
    records: Mutex<Vec<FixtureRecord>>,
}

impl FixtureLedger {
    pub fn record(&self, kind: FixtureKind, key: impl Into<String>) {
        self.records.lock().push(FixtureRecord { kind, key: key.into() });
    }

    pub fn records(&self) -> Vec<FixtureRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Records whose key does not carry the run prefix
    pub fn foreign(&self, data: &TestData) -> Vec<FixtureRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| !data.owns(&r.key))
            .cloned()
            .collect()
    }
}
