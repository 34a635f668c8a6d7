//! Ancillary account and appointment bookkeeping.
//!
//! Nothing here is consulted by the prediction pipeline. A username only ever
//! reaches a report as opaque metadata.

pub mod appointments;
pub mod users;

use thiserror::Error;

pub use appointments::{AppointmentBook, AppointmentRecord};
pub use users::{InMemoryUserStore, UserStore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Username must not be empty.")]
    EmptyUsername,
    #[error("Password must not be empty.")]
    EmptyPassword,
    #[error("User '{0}' is already registered.")]
    AlreadyRegistered(String),
}
