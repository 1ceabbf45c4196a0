//! IDAM web public end-to-end suites
//!
//! Each suite provisions its own prefixed fixtures, drives the citizen
//! journeys through a browser and deletes everything it created.
//!
//! ```no_run
//! # async fn run(env: idam_harness::RunEnvironment) {
//! let summary = idam_scenarios::registry()
//!     .run(&env, &idam_harness::ScenarioFilter::default())
//!     .await;
//! assert!(summary.success());
//! # }
//! ```

pub mod flows;
pub mod suites;

pub use suites::registry;
