//! Endpoint registry.
//!
//! # Responsibilities
//! - Own the authoritative, ordered list of registered endpoints
//! - Reject duplicate registrations and unknown removals
//! - Rebuild and install a fresh routing table after every mutation
//!
//! # Design Decisions
//! - Validate before mutate: every change is applied to a private copy of
//!   the list, compiled, and only then committed and installed
//! - Mutations are serialized by a writer mutex; request dispatch never
//!   touches it
//! - Tables compile from a private snapshot outside the state lock
//! - Table construction happens before the swap, so readers only ever see
//!   complete tables

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;

use crate::observability::metrics;
use crate::routing::dispatcher::Dispatcher;
use crate::routing::endpoint::{Endpoint, EndpointId};
use crate::routing::table::{RoutingTable, TableError, TableOptions};

/// Errors returned by registry mutations. None of them change state.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The endpoint identity is already registered.
    #[error("{0} is already registered")]
    DuplicateEndpoint(EndpointId),

    /// No endpoint with this identity is registered.
    #[error("{0} is not registered")]
    NotFound(EndpointId),

    /// The resulting endpoint list does not compile into a routing table.
    #[error("routing table compilation failed: {0}")]
    Compile(#[from] TableError),
}

impl RegistryError {
    fn reason(&self) -> &'static str {
        match self {
            RegistryError::DuplicateEndpoint(_) => "duplicate",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::Compile(_) => "compile",
        }
    }
}

/// One step of a batched registry update.
#[derive(Debug, Clone)]
pub enum Change {
    Add(Endpoint),
    Remove(EndpointId),
    /// Compile the resulting table with these options.
    Options(TableOptions),
}

#[derive(Clone)]
struct RegistryState {
    endpoints: Vec<Endpoint>,
    options: TableOptions,
    generation: u64,
}

/// Live endpoint list driving the dispatcher's routing table.
pub struct EndpointRegistry {
    /// Serializes mutations; held across compilation.
    writer: Mutex<()>,
    /// Committed state; only held for snapshots and commits.
    state: Mutex<RegistryState>,
    dispatcher: Dispatcher,
}

impl EndpointRegistry {
    /// Create an empty registry that installs its tables into `dispatcher`.
    ///
    /// An empty table compiled with `options` is installed immediately.
    pub fn new(dispatcher: Dispatcher, options: TableOptions) -> Self {
        let registry = Self {
            writer: Mutex::new(()),
            state: Mutex::new(RegistryState {
                endpoints: Vec::new(),
                options,
                generation: dispatcher.read().generation(),
            }),
            dispatcher,
        };
        if let Err(e) = registry.commit(|_| Ok(())) {
            // An empty list always compiles.
            tracing::error!(error = %e, "Failed to install initial routing table");
        }
        registry
    }

    /// Register `endpoint` and rebuild.
    pub fn add(&self, endpoint: Endpoint) -> Result<EndpointId, RegistryError> {
        let id = endpoint.id();
        self.commit(|state| insert(&mut state.endpoints, endpoint))?;
        tracing::info!(endpoint = %id, "Endpoint added");
        Ok(id)
    }

    /// Deregister the endpoint with this identity and rebuild.
    ///
    /// Accepts either an `EndpointId` or `&Endpoint`.
    pub fn remove(&self, endpoint: impl Into<EndpointId>) -> Result<Endpoint, RegistryError> {
        let id = endpoint.into();
        let removed = self.commit(|state| take(&mut state.endpoints, id))?;
        tracing::info!(endpoint = %removed, "Endpoint removed");
        Ok(removed)
    }

    /// Apply a batch of changes with a single rebuild.
    ///
    /// Either every change takes effect or none does, options included.
    pub fn apply(&self, changes: impl IntoIterator<Item = Change>) -> Result<(), RegistryError> {
        let changes: Vec<Change> = changes.into_iter().collect();
        let count = changes.len();
        self.commit(|state| {
            for change in changes {
                match change {
                    Change::Add(endpoint) => insert(&mut state.endpoints, endpoint)?,
                    Change::Remove(id) => {
                        take(&mut state.endpoints, id)?;
                    }
                    Change::Options(options) => state.options = options,
                }
            }
            Ok(())
        })?;
        tracing::info!(changes = count, "Endpoint batch applied");
        Ok(())
    }

    /// Recompile with new table options. Unchanged options do not rebuild.
    pub fn set_options(&self, options: TableOptions) -> Result<(), RegistryError> {
        if self.options() == options {
            return Ok(());
        }
        self.apply([Change::Options(options)])
    }

    /// Snapshot of the registered endpoints in registration order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.lock().endpoints.clone()
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.lock().endpoints.iter().any(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generation of the most recently installed table.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn options(&self) -> TableOptions {
        self.lock().options
    }

    /// The dispatcher this registry installs tables into.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `mutate` against a snapshot, compile it, then commit and install.
    /// On any error the registry and dispatcher are untouched.
    ///
    /// Compilation runs outside the state lock, so readers of the registry
    /// are not blocked by a rebuild.
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut RegistryState) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = self.lock().clone();

        let output = mutate(&mut candidate).map_err(|e| {
            metrics::record_rejection(e.reason());
            tracing::warn!(error = %e, "Registry change rejected");
            e
        })?;

        candidate.generation += 1;
        let started = Instant::now();
        let table = RoutingTable::compile(
            &candidate.endpoints,
            candidate.options,
            candidate.generation,
        )
        .map_err(|e| {
            let e = RegistryError::from(e);
            metrics::record_rejection(e.reason());
            tracing::warn!(error = %e, "Routing table rebuild rejected");
            e
        })?;

        tracing::debug!(
            generation = candidate.generation,
            endpoints = table.endpoint_count(),
            routes = table.route_count(),
            "Routing table compiled"
        );
        metrics::record_rebuild(started, candidate.endpoints.len(), candidate.generation);

        let mut state = self.lock();
        *state = candidate;
        self.dispatcher.replace(table);
        Ok(output)
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &state.endpoints)
            .field("options", &state.options)
            .field("generation", &state.generation)
            .finish()
    }
}

fn insert(endpoints: &mut Vec<Endpoint>, endpoint: Endpoint) -> Result<(), RegistryError> {
    if endpoints.contains(&endpoint) {
        return Err(RegistryError::DuplicateEndpoint(endpoint.id()));
    }
    endpoints.push(endpoint);
    Ok(())
}

fn take(endpoints: &mut Vec<Endpoint>, id: EndpointId) -> Result<Endpoint, RegistryError> {
    let pos = endpoints
        .iter()
        .position(|e| e.id() == id)
        .ok_or(RegistryError::NotFound(id))?;
    Ok(endpoints.remove(pos))
}
