//! # TurboFetch
//!
//! Request orchestration over a pluggable [`Transport`].
//!
//! TurboFetch sits between application code and whatever actually performs
//! network I/O. It turns an [`Address`] plus [`RequestParameters`] into a
//! [`BuiltRequest`], runs it through an ordered pipeline of [`Plugin`]s,
//! hands it to the transport, and decodes the result into the shape the
//! caller asked for.
//!
//! ## Features
//!
//! - **Start-once tasks**: every request is a [`Task`] that does nothing until
//!   started and can be cancelled at any point; [`TaskFuture`] wraps a task
//!   for `async` callers
//! - **Plugin pipeline**: `prepare`, `will_send`, `verify`, `did_receive`,
//!   `did_finish` and `was_cancelled` hooks, ordered by [`Priority`]
//! - **Recovery coordination**: per-request retry, or stop-the-line, where
//!   one failure pauses the whole manager while a single recovery action
//!   (a token refresh, say) runs
//! - **Response cache**: per-request [`CachePolicy`] over a
//!   [`ResponseCache`] such as [`MemoryCache`]
//! - **Configuration**: [`ManagerConfig`] loads from TOML, YAML or JSON with
//!   environment overrides
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use turbofetch::{
//!     BearerAuthPlugin, RequestManager, RequestParameters, RetryPolicy,
//!     StatusValidationPlugin, TokenStore,
//! };
//!
//! # async fn example(transport: impl turbofetch::Transport + 'static) -> turbofetch::Result<()> {
//! let tokens = TokenStore::with_token("initial");
//! let manager = RequestManager::builder()
//!     .with_transport(transport)
//!     .with_base_url("https://api.example.com/")
//!     .with_plugin(BearerAuthPlugin::new(tokens.clone()))
//!     .with_plugin(StatusValidationPlugin::default())
//!     .with_recovery(RetryPolicy::default())
//!     .build()?;
//!
//! let profile: serde_json::Value = manager.json("me", RequestParameters::get()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Callback style
//!
//! ```rust,ignore
//! let task = manager.request_data("status", RequestParameters::get(), |result| {
//!     match result {
//!         Ok(data) => println!("{} bytes", data.body.len()),
//!         Err(e) => eprintln!("failed: {e}"),
//!     }
//! });
//! task.start();
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
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod address;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metadata;
pub mod plugins;
pub mod recovery;
mod request;
pub mod response;
pub mod task;

pub use address::{Address, Body, DefaultRequestFactory, RequestFactory, RequestParameters};
pub use cache::{
    CacheConfig, CachePolicy, CacheStats, CachedResponse, MemoryCache, ResponseCache, cache_key,
};
pub use config::{CompletionQueue, ConfigError, LogOutput, LoggingConfig, ManagerConfig};
pub use error::{Error, Result};
pub use manager::{RequestId, RequestManager, RequestManagerBuilder};
pub use metadata::{ATTEMPT_KEY, CORRELATION_ID_KEY, UserInfo};
pub use plugins::{
    BearerAuthPlugin, HeadersPlugin, Plugin, PluginError, PluginId, PluginPipeline, PluginResult,
    Priority, RequestIdPlugin, StatusValidationPlugin, TokenStore, Verification,
};
pub use recovery::{RecoveryCoordinator, RecoveryOutcome, RetryDecision, RetryPolicy};
pub use response::{DataResponse, Exchange, Image, ImageFormat};
pub use task::{Task, TaskFuture, TaskState};

pub use turbofetch_transport_traits::{
    BuiltRequest, Bytes, HeaderMap, HeaderName, HeaderValue, Method, ResponseMeta, StatusCode,
    Transport, TransportError, TransportOutcome, TransportResult, Url,
};

/// Re-exported so plugin and coordinator implementors use the same macro
/// version as the traits.
pub use async_trait::async_trait;
