//! PatentsView PatentSearch API integration
//!
//! This module provides:
//! - Request/response types, including the lenient record shapes we flatten
//! - A token-bucket-of-one rate limiter shared by every request on a client
//! - The `SearchApi` seam plus its reqwest-backed implementation
//! - Cursor pagination driven by the sort-key values of the last record

pub mod client;
pub mod error;
pub mod paginate;
pub mod rate_limit;
pub mod types;

pub use client::{HttpSearchClient, RequestMethod, SearchApi};
pub use error::ApiError;
pub use paginate::{paginate, Paginator};
pub use rate_limit::RateLimiter;
pub use types::*;
