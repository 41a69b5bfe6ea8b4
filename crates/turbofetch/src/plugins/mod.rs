//! Plugin system for request interception
//!
//! Plugins hook into each phase of a request's life: preparing the outgoing
//! request, observing it before it is sent, verifying the response, observing
//! each attempt's exchange and the final result, and reacting to cancellation.
//!
//! ## Ordering
//!
//! Manager-level plugins and call-level plugins are merged into a
//! [`PluginPipeline`]: duplicates by [`PluginId`] keep their first occurrence,
//! then the list is stable-sorted by descending [`Priority`]. That order is
//! fixed for the whole lifetime of the request and used for every hook.
//!
//! ## Built-in plugins
//!
//! - [`HeadersPlugin`]: static headers
//! - [`BearerAuthPlugin`]: credentials from a shared [`TokenStore`]
//! - [`StatusValidationPlugin`]: rejects unexpected status codes
//! - [`RequestIdPlugin`]: correlation ids

pub mod builtin;
pub mod core;
pub mod pipeline;

pub use builtin::{
    BearerAuthPlugin, HeadersPlugin, RequestIdPlugin, StatusValidationPlugin, TokenStore,
};
pub use self::core::{Plugin, PluginError, PluginId, PluginResult, Priority, Verification};
pub use pipeline::PluginPipeline;
