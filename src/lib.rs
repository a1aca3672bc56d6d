/// CloudPocket - personal document storage server
///
/// Phone-number accounts with email passcode verification, single-session
/// login, linked family accounts, and documents stored in a blob backend.

pub mod account;
pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod context;
pub mod db;
pub mod documents;
pub mod error;
pub mod jobs;
pub mod lockout;
pub mod mailer;
pub mod metrics;
pub mod otp;
pub mod password;
pub mod phone;
pub mod rate_limit;
pub mod sanitize;
pub mod server;
