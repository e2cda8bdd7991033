//! Agentic Web Scraper
//!
//! A tool server for web scraping and research. Clients send JSON requests
//! naming a tool and its arguments; the server validates the arguments
//! against the tool's contract, runs it, and returns the result as native
//! JSON, XML or Markdown.
//!
//! # Architecture
//!
//! - **Transports**: line-delimited JSON on stdin/stdout, or HTTP with an
//!   SSE push endpoint and a call endpoint
//! - **Dispatcher**: method routing, argument validation, error envelopes
//! - **Tools**: scraping, batch scraping, research projects, usage metrics
//! - **Services**: fetcher, analyst, project store and usage ledger behind
//!   narrow traits
//!
//! # Modules
//!
//! - [`protocol`]: request and response envelopes
//! - [`registry`]: tool contracts and argument validation
//! - [`dispatch`]: the request dispatcher
//! - [`tools`]: tool handlers
//! - [`batch`]: chunked concurrent execution
//! - [`format`]: result trees and their serializers
//! - [`services`]: collaborators used by the tools
//! - [`transport`]: line and HTTP channels

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod console;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod protocol;
pub mod registry;
pub mod services;
pub mod telemetry;
pub mod tools;
pub mod transport;

pub use context::ServerContext;
pub use dispatch::Dispatcher;
pub use error::RpcError;
pub use protocol::{RpcRequest, RpcResponse};
