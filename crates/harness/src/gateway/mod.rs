//! Thin adapters to the identity API and the email provider

pub mod identity;
pub mod notify;

pub use identity::{
    IdamApiClient, IdentityApi, NewRole, NewService, NewUser, PendingRegistration, UserDetails,
};
pub use notify::{EmailInbox, EmailMessage, NotifyClient};
