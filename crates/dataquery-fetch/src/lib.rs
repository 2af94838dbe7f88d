//! HTTP client for the DataQuery file delivery API.
//!
//! - [`DataQueryClient`] - reqwest transport, file catalog and downloader factory
//! - [`ClientConfig`] - Hosts, credentials, timeouts and limits, loadable from the environment
//! - [`TokenProvider`] - Source of the bearer token
//! - [`url::ApiUrls`] - Endpoint URL construction

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod auth;
mod client;
mod config;
mod error;
mod models;
pub mod url;

pub use auth::{StaticToken, TokenProvider, bearer};
pub use client::DataQueryClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use models::{AvailabilityInfo, FileInfo};
