//! Compiled routing table.
//!
//! # Responsibilities
//! - Compile an ordered endpoint list into an immutable lookup structure
//! - Resolve (method, path) to a handler, a trailing-slash redirect, or no match
//! - Attach captured path parameters to the request
//!
//! # Design Decisions
//! - Path matching is delegated to `matchit` (static > param > wildcard)
//! - Later registrations replace earlier ones on the same (path, method) slot
//! - A path match without a handler for the method falls through to the
//!   catch-all for that method, then to 404
//! - Patterns are validated up front so a bad pattern is an error, not a panic

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::observability::metrics;
use crate::routing::endpoint::{Endpoint, EndpointId, Handler};

/// Future returned by [`RoutingTable::dispatch`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Errors raised while compiling a table.
#[derive(Debug, Error)]
pub enum TableError {
    /// The pattern is not a valid path template.
    #[error("invalid path pattern {path:?}: {reason}")]
    InvalidPattern { path: String, reason: String },

    /// The matcher rejected the pattern, usually because it conflicts with
    /// another registered pattern.
    #[error("path pattern {path:?} rejected by matcher: {source}")]
    Conflict {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// Options applied when compiling a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// Redirect `/a/` to `/a` (and the reverse) when only the other form is
    /// registered.
    pub strict_slash: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { strict_slash: true }
    }
}

/// Path parameters captured by the matched pattern.
///
/// Inserted into request extensions before the handler runs and usable as an
/// extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S> FromRequestParts<S> for PathParams
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<PathParams>().cloned().unwrap_or_default())
    }
}

/// Handler slot for one endpoint on one (path, method) pair.
#[derive(Debug, Clone)]
struct Target {
    endpoint: EndpointId,
    handler: Handler,
}

/// Per-path method dispatch.
#[derive(Debug, Clone, Default)]
struct MethodTable {
    by_method: HashMap<Method, Target>,
    any: Option<Target>,
}

impl MethodTable {
    fn insert(&mut self, methods: Option<&[Method]>, target: &Target) {
        match methods {
            Some(methods) => {
                for method in methods {
                    self.by_method.insert(method.clone(), target.clone());
                }
            }
            None => self.any = Some(target.clone()),
        }
    }

    fn lookup(&self, method: &Method) -> Option<&Target> {
        self.by_method.get(method).or(self.any.as_ref())
    }

    fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.any.is_none()
    }
}

/// Outcome of resolving a request against a table.
#[derive(Debug)]
pub enum Resolution {
    /// A handler was found.
    Matched {
        endpoint: EndpointId,
        handler: Handler,
        params: PathParams,
    },
    /// Only the trailing-slash variant of the path is registered.
    Redirect { location: String },
    /// Nothing matched.
    NotFound,
}

/// Immutable, fully compiled routing table.
pub struct RoutingTable {
    paths: matchit::Router<MethodTable>,
    catch_all: MethodTable,
    options: TableOptions,
    generation: u64,
    endpoint_count: usize,
    route_count: usize,
}

impl RoutingTable {
    /// A table with no routes. Every request resolves to 404.
    pub fn empty() -> Self {
        Self {
            paths: matchit::Router::new(),
            catch_all: MethodTable::default(),
            options: TableOptions::default(),
            generation: 0,
            endpoint_count: 0,
            route_count: 0,
        }
    }

    /// Compile `endpoints`, in order, into a new table.
    pub fn compile(
        endpoints: &[Endpoint],
        options: TableOptions,
        generation: u64,
    ) -> Result<Self, TableError> {
        // Group by pattern first so each pattern is inserted into the matcher
        // exactly once, keeping first-seen order.
        let mut patterns: Vec<(String, MethodTable)> = Vec::new();
        let mut catch_all = MethodTable::default();
        let mut route_count = 0;

        for endpoint in endpoints {
            let target = Target {
                endpoint: endpoint.id(),
                handler: endpoint.handler().clone(),
            };
            let methods = endpoint.methods();
            if methods.is_some_and(<[Method]>::is_empty) {
                continue;
            }

            match endpoint.paths() {
                None => {
                    catch_all.insert(methods, &target);
                    route_count += 1;
                }
                Some(paths) => {
                    for path in paths {
                        validate_pattern(path)?;
                        match patterns.iter_mut().find(|(p, _)| p == path) {
                            Some((_, table)) => table.insert(methods, &target),
                            None => {
                                let mut table = MethodTable::default();
                                table.insert(methods, &target);
                                patterns.push((path.clone(), table));
                            }
                        }
                        route_count += 1;
                    }
                }
            }
        }

        let mut paths = matchit::Router::new();
        for (path, table) in patterns {
            paths
                .insert(path.clone(), table)
                .map_err(|source| TableError::Conflict { path, source })?;
        }

        Ok(Self {
            paths,
            catch_all,
            options,
            generation,
            endpoint_count: endpoints.len(),
            route_count,
        })
    }

    /// Resolve a method and path against this table.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        if let Ok(matched) = self.paths.at(path) {
            if let Some(target) = matched.value.lookup(method) {
                let params = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                return Resolution::Matched {
                    endpoint: target.endpoint,
                    handler: target.handler.clone(),
                    params: PathParams(params),
                };
            }
        } else if self.options.strict_slash {
            if let Some(alternate) = toggle_trailing_slash(path) {
                let routable = self
                    .paths
                    .at(&alternate)
                    .is_ok_and(|m| m.value.lookup(method).is_some());
                if routable {
                    return Resolution::Redirect { location: alternate };
                }
            }
        }

        match self.catch_all.lookup(method) {
            Some(target) => Resolution::Matched {
                endpoint: target.endpoint,
                handler: target.handler.clone(),
                params: PathParams::default(),
            },
            None => Resolution::NotFound,
        }
    }

    /// Route `request` and return the future producing its response.
    ///
    /// Resolution happens before this returns; the future does not borrow the
    /// table.
    pub fn dispatch(&self, mut request: Request) -> ResponseFuture {
        match self.resolve(request.method(), request.uri().path()) {
            Resolution::Matched {
                endpoint,
                handler,
                params,
            } => {
                metrics::record_dispatch("matched");
                tracing::trace!(
                    endpoint = %endpoint,
                    generation = self.generation,
                    "Route matched"
                );
                request.extensions_mut().insert(params);
                Box::pin(handler.call(request))
            }
            Resolution::Redirect { mut location } => {
                metrics::record_dispatch("redirect");
                if let Some(query) = request.uri().query() {
                    location.push('?');
                    location.push_str(query);
                }
                let response =
                    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
                Box::pin(std::future::ready(response))
            }
            Resolution::NotFound => {
                metrics::record_dispatch("not_found");
                tracing::debug!(
                    method = %request.method(),
                    path = %request.uri().path(),
                    generation = self.generation,
                    "No route matched"
                );
                Box::pin(std::future::ready(StatusCode::NOT_FOUND.into_response()))
            }
        }
    }

    /// Rebuild counter this table was compiled at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn options(&self) -> TableOptions {
        self.options
    }

    /// Number of endpoints the table was compiled from.
    pub fn endpoint_count(&self) -> usize {
        self.endpoint_count
    }

    /// Number of (endpoint, path) registrations, counting each catch-all once.
    pub fn route_count(&self) -> usize {
        self.route_count
    }

    pub fn has_catch_all(&self) -> bool {
        !self.catch_all.is_empty()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("generation", &self.generation)
            .field("endpoint_count", &self.endpoint_count)
            .field("route_count", &self.route_count)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.strip_suffix('/') {
        Some(trimmed) => Some(trimmed.to_string()),
        None => Some(format!("{path}/")),
    }
}

/// Check a pattern before handing it to the matcher.
pub fn validate_pattern(path: &str) -> Result<(), TableError> {
    let invalid = |reason: &str| TableError::InvalidPattern {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => i += 2,
            b'}' if bytes.get(i + 1) == Some(&b'}') => i += 2,
            b'{' => {
                let close = path[i..]
                    .find('}')
                    .map(|offset| i + offset)
                    .ok_or_else(|| invalid("unclosed '{'"))?;
                let name = &path[i + 1..close];
                let (wildcard, ident) = match name.strip_prefix('*') {
                    Some(rest) => (true, rest),
                    None => (false, name),
                };
                if ident.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                if !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("parameter names may only contain [A-Za-z0-9_]"));
                }
                if wildcard && close + 1 != bytes.len() {
                    return Err(invalid("wildcard parameter must be the last segment"));
                }
                i = close + 1;
            }
            b'}' => return Err(invalid("unmatched '}'")),
            _ => i += 1,
        }
    }
    Ok(())
}
