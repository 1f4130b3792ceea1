//! Fitbit Web API access
//!
//! The endpoint catalog and the client that calls it through the
//! [`AccessGuard`](crate::oauth::AccessGuard).

mod catalog;
mod client;

pub use catalog::{ApiVersion, CATALOG, Endpoint, ParamSpec, find};
pub use client::FitbitClient;
