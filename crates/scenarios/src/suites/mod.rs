pub mod cross_browser;
pub mod pending_uuid;
pub mod reset_password;
pub mod self_registration;
pub mod welsh_language;

use idam_harness::Registry;

/// Every suite in the order they run
pub fn registry() -> Registry {
    Registry::new()
        .register(self_registration::suite())
        .register(reset_password::suite())
        .register(welsh_language::suite())
        .register(pending_uuid::suite())
        .register(cross_browser::suite())
}
