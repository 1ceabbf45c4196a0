//! IDAM end-to-end harness
//!
//! Drives browser scenarios against the citizen identity web application:
//! - Provisions prefixed fixtures through the identity API per suite
//! - Runs each scenario attempt in its own Playwright browser session
//! - Reads activation and reset emails from GOV.UK Notify
//! - Reports verdicts to logs, Sauce Labs and a JSON results document
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Registry                                                   │
//! │    └── Suite<F>                                             │
//! │          ├── setup(SuiteContext) -> F        (once)         │
//! │          ├── Scenario<F> x N                 (concurrent)   │
//! │          │     └── attempt 0..=retry                        │
//! │          │           ├── DriverLauncher::launch() -> Actor  │
//! │          │           ├── Step(&mut Actor, &F) ...           │
//! │          │           └── RunReporter::on_scenario_*         │
//! │          └── teardown(SuiteContext)          (always)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Actor                                                      │
//! │    ├── BrowserDriver (PlaywrightSession, JSON lines)        │
//! │    ├── IdentityApi   (IdamApiClient)                        │
//! │    └── EmailInbox    (NotifyClient)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actor;
pub mod config;
pub mod driver;
pub mod error;
pub mod fixtures;
pub mod gateway;
pub mod health;
pub mod locale;
pub mod playwright;
pub mod registry;
pub mod reporter;
pub mod results;
pub mod runner;
pub mod suite;
pub mod urls;

pub use actor::{Actor, Collaborators, InterceptionGuard};
pub use config::HarnessConfig;
pub use driver::{BrowserDriver, DriverLauncher};
pub use error::{HarnessError, HarnessResult};
pub use fixtures::{TestData, UserFixture};
pub use locale::Locale;
pub use registry::Registry;
pub use results::RunSummary;
pub use runner::{Retry, Scenario, ScenarioStatus};
pub use suite::{RunEnvironment, ScenarioFilter, Suite, SuiteContext};
pub use urls::AppUrls;
