pub mod buffer;
pub mod certs;
pub mod client;
pub mod config;
pub mod error;
pub mod humanize;
pub mod link;
pub mod observability;
pub mod persist;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod server;
pub mod worker;

pub use client::{WebClient, WebClientBuilder};
pub use error::{FetchError, RequestError};
