//! Client-side synchronization layer for the Coliseum trading dashboard.
//!
//! [`cache::PollingCache`] keeps one entry per backend resource fresh on its own
//! cadence; the lifecycle model and aggregators turn cached payloads into panel
//! data; [`session::Dashboard`] wires them together for a view.

pub mod agents;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod money;
pub mod opportunity;
pub mod pipeline;
pub mod portfolio;
pub mod resource;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod types;
