//! Ride Dispatch - SMS driver dispatch service
//!
//! A rider request is texted to a single driver, the driver answers
//! `ACCEPT <id>` or `IGNORE <id>`, and the rider's client polls for the result.

pub mod channel;
pub mod client;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inbound;
pub mod phone;
pub mod poller;
pub mod ride;
pub mod ride_id;
pub mod server;
pub mod store;

pub use error::{Error, Result};
