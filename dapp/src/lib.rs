//! Client for the Satoshi Standard (SATSTD) reserve-backed token.
//!
//! Connects a wallet, resolves what the connected address may do, keeps a
//! snapshot of the reserve and supply, and submits mint, burn and admin
//! actions one at a time while streaming contract events into a log.

pub mod actions;
pub mod app;
pub mod capacity;
pub mod config;
pub mod controls;
pub mod errors;
pub mod events;
pub mod local;
pub mod provider;
pub mod roles;
pub mod session;
pub mod units;

pub use app::{ActionOutcome, Banner, BannerKind, DappClient};
pub use config::DappConfig;
pub use errors::{DappError, DappResult};
pub use local::{LocalNetwork, LocalNetworkConfig};
