//! REST gateway for the pocketledger backend.
//!
//! Implements the core `RemoteGateway` contract for categories and
//! transactions over JSON/HTTP.

mod client;
mod config;
mod error;
mod gateway;

pub use client::RestClient;
pub use config::RemoteConfig;
pub use error::{RemoteError, Result};
pub use gateway::{category_gateway, transaction_gateway, ClientKeyed, RestGateway};
