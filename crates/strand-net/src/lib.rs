#![forbid(unsafe_code)]

//! HTTP fetching for the strand download engine.
//!
//! The [`Fetcher`] trait is the single seam the rest of the workspace sees:
//! "resolve a URL to a readable byte stream". [`HttpClient`] is the reqwest
//! implementation; [`retry::with_retry`] wraps any fetch in the engine's
//! transient-fault retry policy.

mod client;
mod error;
mod retry;
mod traits;
mod types;

pub use client::HttpClient;
pub use error::{NetError, NetResult};
pub use retry::with_retry;
pub use traits::{ByteStream, Fetcher};
pub use types::{NetOptions, RetryPolicy};
