//! HTTP inbound adapter exposing the account, contact and probe endpoints.

pub mod accounts;
pub mod contact;
pub mod error;
pub mod health;
pub mod request_log;
pub mod session;
pub mod state;
#[cfg(test)]
pub mod test_utils;

pub use error::ApiResult;
