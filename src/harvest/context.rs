//! Per-invocation harvest context

use super::error::HarvestError;
use crate::config::{GleanerConfig, HarvestSettings};
use crate::downstream::{DownstreamConsumer, HttpDownstream};
use crate::ledger::RunLedger;
use crate::model::Source;
use crate::notify::{LogNotifier, Notifier};
use crate::resolver::{HttpSecondary, SecondaryClient};
use crate::upstream::{ArrangementClient, CatalogClient, UpstreamClient};
use std::collections::HashMap;
use std::sync::Arc;

/// Clients and settings shared by every task of one harvest
///
/// Built once per invocation; clients are safe for concurrent use.
#[derive(Clone)]
pub struct HarvestContext {
    pub ledger: Arc<dyn RunLedger>,
    pub secondary: Arc<dyn SecondaryClient>,
    pub downstream: Arc<dyn DownstreamConsumer>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: HarvestSettings,
    upstreams: HashMap<Source, Arc<dyn UpstreamClient>>,
}

impl HarvestContext {
    pub fn new(
        ledger: Arc<dyn RunLedger>,
        secondary: Arc<dyn SecondaryClient>,
        downstream: Arc<dyn DownstreamConsumer>,
    ) -> Self {
        Self {
            ledger,
            secondary,
            downstream,
            notifier: Arc::new(LogNotifier),
            settings: HarvestSettings::default(),
            upstreams: HashMap::new(),
        }
    }

    /// Register the client for the source it reports
    pub fn with_upstream(mut self, client: Arc<dyn UpstreamClient>) -> Self {
        self.upstreams.insert(client.source(), client);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: HarvestSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the HTTP clients described by `config`
    pub fn from_config(config: &GleanerConfig, ledger: Arc<dyn RunLedger>) -> Result<Self, HarvestError> {
        config
            .validate()
            .map_err(|e| HarvestError::Setup(e.to_string()))?;

        let timeout = config.request_timeout();
        let catalog = Arc::new(
            CatalogClient::new(&config.catalog, config.harvest.page_size, timeout)
                .map_err(|e| HarvestError::Setup(format!("catalog client: {}", e)))?,
        );
        let arrangement = Arc::new(
            ArrangementClient::new(&config.arrangement, timeout)
                .map_err(|e| HarvestError::Setup(format!("arrangement client: {}", e)))?,
        );
        let downstream = HttpDownstream::new(&config.downstream, timeout)
            .map_err(|e| HarvestError::Setup(format!("downstream client: {}", e)))?;

        let secondary = HttpSecondary::new(catalog.clone(), arrangement.clone());

        Ok(Self::new(ledger, Arc::new(secondary), Arc::new(downstream))
            .with_upstream(catalog)
            .with_upstream(arrangement)
            .with_settings(config.harvest.clone()))
    }

    /// The client for `source`
    pub fn upstream(&self, source: Source) -> Result<Arc<dyn UpstreamClient>, HarvestError> {
        self.upstreams
            .get(&source)
            .cloned()
            .ok_or_else(|| HarvestError::Setup(format!("no client configured for {}", source)))
    }
}
