//! Backends used when no hosted service is configured.

mod gateway;
mod identity;
pub mod password;

pub use gateway::{LocalGateway, DEFAULT_DATA_FILE};
pub use identity::{
    accounts_file_for, LocalIdentityProvider, DEFAULT_SIGNUP_ATTEMPTS, DEFAULT_SIGNUP_WINDOW,
};
