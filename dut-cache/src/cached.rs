//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Error;
use crate::storage::FactsCache;

/// Extracts the zone of a call from the name of the cached function and the
/// call arguments.
pub type ZoneGetter<A> =
    Box<dyn Fn(&str, &A) -> Result<String, Error> + Send + Sync>;

/// Validates a cached entry before it's returned. `None` means the entry is
/// absent; returning `None` forces the lookup to be computed again.
pub type AfterRead<A, T, S> =
    Box<dyn Fn(Option<S>, &A) -> Option<T> + Send + Sync>;

/// Annotates a freshly computed value before it's stored.
pub type BeforeWrite<A, T, S> = Box<dyn Fn(&T, &A) -> S + Send + Sync>;

type Function<A, T, E> = Box<dyn Fn(&A) -> Result<T, E> + Send + Sync>;

/// Call parameters of a cached lookup, addressable by name.
pub trait CallArgs {
    /// Returns the value of a named parameter.
    fn param(&self, name: &str) -> Option<String>;

    /// Returns the free-form extra arguments of the call, if the lookup takes
    /// any.
    fn extra(&self) -> Option<&BTreeMap<String, String>> {
        None
    }
}

/// A fact lookup whose results are cached in a [`FactsCache`].
///
/// Results are stored under `(zone, namespace)`, where the zone is derived
/// from the call arguments by the zone getter. Callers always get back the
/// value computed by the wrapped function; what's actually stored can be a
/// different type `S` produced by the `before_write` hook, and turned back
/// into `T` by the `after_read` hook.
pub struct Cached<A, T, E, S = T> {
    namespace: String,
    cache: Arc<FactsCache>,
    zone_getter: ZoneGetter<A>,
    after_read: AfterRead<A, T, S>,
    before_write: BeforeWrite<A, T, S>,
    function: Function<A, T, E>,
}

// ===== impl Cached =====

impl<A, T, E> Cached<A, T, E, T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
    E: From<Error>,
    A: 'static,
{
    /// Wraps a lookup whose results are stored as is.
    pub fn new<F>(
        namespace: impl Into<String>,
        cache: Arc<FactsCache>,
        zone_getter: ZoneGetter<A>,
        function: F,
    ) -> Cached<A, T, E, T>
    where
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        Cached::with_hooks(
            namespace,
            cache,
            zone_getter,
            |facts, _| facts,
            |facts: &T, _| facts.clone(),
            function,
        )
    }
}

impl<A, T, E, S> Cached<A, T, E, S>
where
    S: Serialize + DeserializeOwned,
    E: From<Error>,
{
    /// Wraps a lookup with custom read validation and write annotation.
    pub fn with_hooks<F, R, W>(
        namespace: impl Into<String>,
        cache: Arc<FactsCache>,
        zone_getter: ZoneGetter<A>,
        after_read: R,
        before_write: W,
        function: F,
    ) -> Cached<A, T, E, S>
    where
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
        R: Fn(Option<S>, &A) -> Option<T> + Send + Sync + 'static,
        W: Fn(&T, &A) -> S + Send + Sync + 'static,
    {
        Cached {
            namespace: namespace.into(),
            cache,
            zone_getter,
            after_read: Box::new(after_read),
            before_write: Box::new(before_write),
            function: Box::new(function),
        }
    }

    /// Returns the name under which results are stored in every zone.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Performs the lookup, returning the cached result when there's a valid
    /// one.
    ///
    /// Failing to resolve the zone is fatal. Failing to store a freshly
    /// computed result is only logged.
    pub fn call(&self, args: &A) -> Result<T, E> {
        let zone = (self.zone_getter)(&self.namespace, args)?;

        if !self.cache.is_enabled() {
            return (self.function)(args);
        }

        let cached = self.cache.read::<S>(&zone, &self.namespace);
        if let Some(facts) = (self.after_read)(cached, args) {
            debug!(%zone, namespace = %self.namespace, "using cached facts");
            return Ok(facts);
        }

        let facts = (self.function)(args)?;
        let annotated = (self.before_write)(&facts, args);
        if let Err(error) = self.cache.write(&zone, &self.namespace, &annotated)
        {
            error.log();
        }
        Ok(facts)
    }
}

impl<A, T, E, S> std::fmt::Debug for Cached<A, T, E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cached")
            .field("namespace", &self.namespace)
            .field("cache", &self.cache)
            .finish()
    }
}

// ===== global functions =====

/// Returns a zone getter that uses the value of the named parameter as zone.
///
/// The parameter is looked up among the regular call parameters first, then
/// among the extra arguments. A missing parameter is reported as
/// [`Error::ZoneNotFound`].
pub fn zone_by_param<A>(name: &'static str) -> ZoneGetter<A>
where
    A: CallArgs,
{
    Box::new(move |function, args| {
        args.param(name)
            .or_else(|| args.extra().and_then(|extra| extra.get(name).cloned()))
            .ok_or_else(|| {
                Error::ZoneNotFound(function.to_owned(), name.to_owned())
            })
    })
}

/// Returns the default zone getter, which partitions facts by hostname.
pub fn default_zone_getter<A>() -> ZoneGetter<A>
where
    A: CallArgs,
{
    zone_by_param("hostname")
}
