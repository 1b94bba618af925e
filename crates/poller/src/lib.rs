// crates/poller/src/lib.rs
//! Client side of the scarab analysis API.
//!
//! - [`ApiClient`] uploads files and fetches raw job status bodies
//! - [`JobPoller`] follows one job until it completes or fails

pub mod client;
pub mod poller;

pub use client::{ApiClient, ClientError};
pub use poller::{JobPoller, PollFailure, PollState, PollerConfig, StatusSource};
