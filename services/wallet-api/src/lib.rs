//! HTTP transport for the wallet ledger
//!
//! Authenticates the caller from a bearer JWT, validates request bodies,
//! calls [`wallet_ledger::LedgerService`] and maps its errors to responses.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;

pub use crate::auth::{AuthUser, Claims, JwtAuth};
pub use crate::config::ApiConfig;
pub use crate::errors::{ApiError, ApiResult};
