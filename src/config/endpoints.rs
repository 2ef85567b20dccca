//! Reconcile configured endpoints with the live registry.
//!
//! # Responsibilities
//! - Turn `[[endpoints]]` entries into static-response `Endpoint`s
//! - Diff a new endpoint list against what was registered from config
//! - Apply the difference as one atomic registry batch
//!
//! # Design Decisions
//! - Entries are matched by name; unchanged entries keep their identity
//! - A changed entry is removed and re-added in the same batch, so no
//!   request observes the gap
//! - Endpoints registered through the API are never touched
//! - Routing options ride in the same batch, so a rejected reload changes
//!   neither options nor endpoints

use std::collections::HashMap;

use crate::config::schema::EndpointConfig;
use crate::config::validation::parse_method;
use crate::http::response::StaticResponse;
use crate::routing::{
    Change, Endpoint, EndpointId, EndpointRegistry, RegistryError, TableOptions,
};

/// Build the endpoint described by `config`.
///
/// Method tokens that fail to parse are skipped; validation reports them
/// before a config is ever accepted.
pub fn build_endpoint(config: &EndpointConfig) -> Endpoint {
    let response = StaticResponse::from_config(config);
    let mut builder = Endpoint::builder(move || {
        let response = response.clone();
        async move { response }
    })
    .name(config.name.clone());

    if let Some(methods) = &config.methods {
        builder = builder.methods(methods.iter().filter_map(|m| parse_method(m)));
    }
    if let Some(paths) = &config.paths {
        builder = builder.paths(paths.iter().cloned());
    }
    builder.build()
}

/// Summary of one reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub options_changed: bool,
}

impl SyncSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0 && !self.options_changed
    }
}

/// Endpoints currently registered on behalf of the configuration file.
#[derive(Debug, Default)]
pub struct ConfiguredEndpoints {
    registered: HashMap<String, (EndpointConfig, EndpointId)>,
}

impl ConfiguredEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of the endpoint registered for `name`, if any.
    pub fn id_of(&self, name: &str) -> Option<EndpointId> {
        self.registered.get(name).map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Bring the registry in line with `configs`, keeping its current
    /// options.
    ///
    /// On error nothing changes, in the registry or here.
    pub fn sync(
        &mut self,
        registry: &EndpointRegistry,
        configs: &[EndpointConfig],
    ) -> Result<SyncSummary, RegistryError> {
        self.sync_with_options(registry, registry.options(), configs)
    }

    /// Bring the registry in line with `configs` and `options` in one rebuild.
    ///
    /// On error nothing changes, in the registry or here.
    pub fn sync_with_options(
        &mut self,
        registry: &EndpointRegistry,
        options: TableOptions,
        configs: &[EndpointConfig],
    ) -> Result<SyncSummary, RegistryError> {
        let mut summary = SyncSummary::default();
        let mut changes = Vec::new();

        if registry.options() != options {
            changes.push(Change::Options(options));
            summary.options_changed = true;
        }
        let mut next = HashMap::with_capacity(configs.len());

        for config in configs {
            match self.registered.get(&config.name) {
                Some((current, id)) if current == config => {
                    summary.unchanged += 1;
                    next.insert(config.name.clone(), (config.clone(), *id));
                }
                existing => {
                    if let Some((_, id)) = existing {
                        changes.push(Change::Remove(*id));
                        summary.updated += 1;
                    } else {
                        summary.added += 1;
                    }
                    let endpoint = build_endpoint(config);
                    next.insert(config.name.clone(), (config.clone(), endpoint.id()));
                    changes.push(Change::Add(endpoint));
                }
            }
        }

        for (name, (_, id)) in &self.registered {
            if !next.contains_key(name) {
                changes.push(Change::Remove(*id));
                summary.removed += 1;
            }
        }

        if !changes.is_empty() {
            registry.apply(changes)?;
        }
        self.registered = next;

        tracing::info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            unchanged = summary.unchanged,
            options_changed = summary.options_changed,
            "Configured endpoints synchronized"
        );
        Ok(summary)
    }
}
