//! Request manager builder
//!
//! Provides a fluent interface for assembling a manager's collaborators
//! before creation.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use turbofetch_transport_traits::Transport;

use super::{ManagerCore, RequestManager};
use crate::address::{DefaultRequestFactory, RequestFactory};
use crate::cache::ResponseCache;
use crate::config::{CompletionQueue, ManagerConfig};
use crate::error::{Error, Result};
use crate::plugins::Plugin;
use crate::recovery::RecoveryCoordinator;

/// Builder for configuring and creating a [`RequestManager`]
///
/// # Examples
///
/// ```rust,ignore
/// use turbofetch::{RequestManager, RetryPolicy, StatusValidationPlugin};
///
/// let manager = RequestManager::builder()
///     .with_transport(my_transport)
///     .with_plugin(StatusValidationPlugin::default())
///     .with_recovery(RetryPolicy::default())
///     .with_max_attempts(5)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RequestManagerBuilder {
    config: ManagerConfig,
    transport: Option<Arc<dyn Transport>>,
    factory: Option<Arc<dyn RequestFactory>>,
    plugins: Vec<Arc<dyn Plugin>>,
    recovery: Option<Arc<dyn RecoveryCoordinator>>,
    cache: Option<Arc<dyn ResponseCache>>,
    runtime: Option<Handle>,
}

impl RequestManagerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================================================
    // CONFIGURATION
    // ============================================================================

    /// Replace the whole configuration
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Upper bound on attempts per request, first attempt included
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Where completion sinks run
    pub fn with_completion_queue(mut self, queue: CompletionQueue) -> Self {
        self.config.completion_queue = queue;
        self
    }

    /// Base URL relative addresses are joined with
    ///
    /// Ignored when a custom request factory is installed.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Header sent with every request
    ///
    /// Ignored when a custom request factory is installed.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    // ============================================================================
    // COLLABORATORS
    // ============================================================================

    /// The transport every attempt goes through (required)
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// A transport already behind an `Arc`
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Add a manager-wide default plugin
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Add several manager-wide default plugins
    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Install a recovery coordinator
    pub fn with_recovery(mut self, coordinator: impl RecoveryCoordinator + 'static) -> Self {
        self.recovery = Some(Arc::new(coordinator));
        self
    }

    /// Install a shared recovery coordinator
    pub fn with_shared_recovery(mut self, coordinator: Arc<dyn RecoveryCoordinator>) -> Self {
        self.recovery = Some(coordinator);
        self
    }

    /// Install a response cache consulted according to each request's
    /// cache policy
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the default request factory
    pub fn with_request_factory(mut self, factory: impl RequestFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Runtime attempts and completions are spawned on
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the manager
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid, no
    /// transport was provided, or no runtime was given and `build` is called
    /// outside a Tokio runtime.
    pub fn build(self) -> Result<RequestManager> {
        self.config
            .validate()
            .map_err(|e| Error::configuration(e.to_string()))?;

        let transport = self
            .transport
            .ok_or_else(|| Error::configuration("a transport is required"))?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                Error::configuration(format!("no runtime given and none running: {e}"))
            })?,
        };

        let factory: Arc<dyn RequestFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(DefaultRequestFactory::from_config(&self.config)?),
        };

        tracing::debug!(
            transport = transport.name(),
            plugins = self.plugins.len(),
            recovery = self.recovery.is_some(),
            cache = self.cache.is_some(),
            max_attempts = self.config.max_attempts,
            "building request manager"
        );

        let core = ManagerCore::new(
            self.config,
            transport,
            factory,
            self.plugins,
            self.cache,
            runtime,
        );
        Ok(RequestManager::from_core(Arc::new(core), self.recovery))
    }
}

impl fmt::Debug for RequestManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestManagerBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("plugins", &self.plugins.len())
            .field("recovery", &self.recovery)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
