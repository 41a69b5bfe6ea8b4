//! The merged, ordered plugin list that drives one request.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use turbofetch_transport_traits::BuiltRequest;

use crate::address::RequestParameters;
use crate::error::Error;
use crate::metadata::UserInfo;
use crate::plugins::core::{Plugin, PluginId, Verification};
use crate::response::Exchange;

/// Plugins in hook order for one request.
///
/// Built once per logical request by [`PluginPipeline::merge`] and never
/// reordered afterwards, so every attempt and every phase sees the same order.
#[derive(Debug, Clone, Default)]
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginPipeline {
    /// Merges manager defaults with call-level plugins.
    ///
    /// Duplicates (same [`PluginId`]) keep their first occurrence, defaults
    /// before call plugins. The result is stable-sorted by descending
    /// priority, so equal priorities keep their relative order.
    pub fn merge(defaults: &[Arc<dyn Plugin>], call: &[Arc<dyn Plugin>]) -> Self {
        let mut seen = HashSet::new();
        let mut plugins: Vec<Arc<dyn Plugin>> = defaults
            .iter()
            .chain(call)
            .filter(|plugin| seen.insert(plugin.id()))
            .cloned()
            .collect();
        plugins.sort_by_key(|plugin| Reverse(plugin.priority()));
        Self { plugins }
    }

    /// Plugin ids in hook order.
    pub fn ids(&self) -> Vec<PluginId> {
        self.plugins.iter().map(|p| p.id()).collect()
    }

    /// Number of plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if there are no plugins.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub(crate) async fn prepare(
        &self,
        parameters: &RequestParameters,
        request: &mut BuiltRequest,
        user_info: &UserInfo,
    ) {
        for plugin in &self.plugins {
            debug!(plugin = %plugin.id(), "prepare");
            plugin.prepare(parameters, request, user_info).await;
        }
    }

    pub(crate) async fn will_send(
        &self,
        parameters: &RequestParameters,
        request: &BuiltRequest,
        user_info: &UserInfo,
    ) {
        for plugin in &self.plugins {
            plugin.will_send(parameters, request, user_info).await;
        }
    }

    /// Runs `verify` until the first rejection.
    pub(crate) async fn verify(&self, exchange: &Exchange) -> Option<Error> {
        for plugin in &self.plugins {
            if let Verification::Reject(reason) = plugin.verify(exchange).await {
                let id = plugin.id();
                debug!(plugin = %id, %reason, "response rejected");
                return Some(Error::from_rejection(id, reason));
            }
        }
        None
    }

    pub(crate) async fn did_receive(
        &self,
        parameters: &RequestParameters,
        exchange: &Exchange,
        user_info: &UserInfo,
    ) {
        for plugin in &self.plugins {
            plugin.did_receive(parameters, exchange, user_info).await;
        }
    }

    pub(crate) async fn did_finish(&self, exchange: &Exchange, user_info: &UserInfo) {
        for plugin in &self.plugins {
            plugin.did_finish(exchange, user_info).await;
        }
    }

    pub(crate) fn was_cancelled(&self, parameters: &RequestParameters, user_info: &UserInfo) {
        for plugin in &self.plugins {
            plugin.was_cancelled(parameters, user_info);
        }
    }
}
