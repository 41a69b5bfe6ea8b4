//! # TurboFetch Transport Traits
//!
//! The transport contract for the TurboFetch request orchestration layer.
//! Everything that actually talks to the network lives behind the [`Transport`]
//! trait defined here; the orchestration core in `turbofetch` only ever sees
//! a [`BuiltRequest`] going in and a [`TransportOutcome`] coming back.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Transport`]
//! - **Types**: [`BuiltRequest`], [`ResponseMeta`], [`TransportOutcome`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turbofetch_transport_traits::{BuiltRequest, Transport, TransportOutcome};
//! use std::{future::Future, pin::Pin};
//!
//! #[derive(Debug)]
//! struct MyTransport { /* ... */ }
//!
//! impl Transport for MyTransport {
//!     fn execute(
//!         &self,
//!         request: BuiltRequest,
//!     ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>> {
//!         Box::pin(async move { /* perform I/O */ })
//!     }
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod error;
mod message;
mod traits;

pub use error::{TransportError, TransportResult};
pub use message::{BuiltRequest, ResponseMeta, TransportOutcome};
pub use traits::Transport;

// Collaborators implementing `Transport` need these to build requests and responses.
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
pub use url::Url;
