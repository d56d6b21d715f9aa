//! Query descriptors.
//!
//! A [`QueryDescriptor`] holds the filter expression, sort order and result
//! limit a collection is browsing. Filter and sort are opaque values owned by
//! the caller: the engine only clones and compares them, and asks the filter
//! type to express "everything except these ids" (see [`FilterExpr`]).
//!
//! Every effective change is announced on [`QueryDescriptor::changed`] with a
//! [`QueryChange`] so caches can drop what the change made stale.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_pageable::{FilterExpr, QueryChange, QueryDescriptor, QueryParams};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Filter {
//!     NameStartsWith(String),
//!     Excluding(Option<Box<Filter>>, Vec<u32>),
//! }
//!
//! impl FilterExpr<u32> for Filter {
//!     fn exclude_ids(base: Option<&Self>, ids: &[u32]) -> Self {
//!         Filter::Excluding(base.cloned().map(Box::new), ids.to_vec())
//!     }
//! }
//!
//! let query = Arc::new(QueryDescriptor::<Filter, String>::new(QueryParams::new()));
//! query.changed.connect(|change| println!("query changed: {:?}", change));
//!
//! assert!(query.set_filter(Some(Filter::NameStartsWith("A".into()))));
//! assert!(!query.set_filter(Some(Filter::NameStartsWith("A".into()))));
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use horizon_pageable_core::{ConnectionId, Signal};
use parking_lot::RwLock;

/// A filter expression that can exclude a set of ids.
///
/// Strategies use this to hide locally removed items from query results
/// before the removal reaches the backend.
pub trait FilterExpr<Id>: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Returns `base AND NOT (id IN ids)`, or `NOT (id IN ids)` without a base.
    fn exclude_ids(base: Option<&Self>, ids: &[Id]) -> Self;
}

/// A snapshot of query parameters.
///
/// Passed by reference to the backing service and stored by selections and
/// caches; equality decides whether a cached result still applies.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams<F, S> {
    filter: Option<F>,
    sort: Option<S>,
    max_results: Option<u64>,
}

impl<F, S> Default for QueryParams<F, S> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            max_results: None,
        }
    }
}

impl<F, S> QueryParams<F, S> {
    /// Unfiltered, unsorted, unlimited parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter expression.
    pub fn with_filter(mut self, filter: F) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the sort order.
    pub fn with_sort(mut self, sort: S) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the result limit.
    pub fn with_max_results(mut self, max_results: u64) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// The filter expression, if any.
    pub fn filter(&self) -> Option<&F> {
        self.filter.as_ref()
    }

    /// The sort order, if any.
    pub fn sort(&self) -> Option<&S> {
        self.sort.as_ref()
    }

    /// The result limit, if any.
    pub fn max_results(&self) -> Option<u64> {
        self.max_results
    }

    /// Replace the filter, keeping sort and limit.
    pub fn replace_filter(mut self, filter: Option<F>) -> Self {
        self.filter = filter;
        self
    }
}

/// What part of a query descriptor changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryChange {
    /// The filter expression changed; counts and windows are stale.
    Filter,
    /// The sort order changed; windows are stale, counts are not.
    Sort,
    /// The result limit changed.
    MaxResults,
}

impl QueryChange {
    /// Returns `true` if item counts computed before this change are stale.
    pub fn affects_count(self) -> bool {
        matches!(self, Self::Filter)
    }

    /// Returns `true` if result windows fetched before this change are stale.
    pub fn affects_window(self) -> bool {
        matches!(self, Self::Filter | Self::Sort)
    }
}

/// The mutable query a collection browses.
///
/// Shared (`Arc`) between the collection facade and its caches.
pub struct QueryDescriptor<F, S> {
    params: RwLock<QueryParams<F, S>>,
    /// Emitted after every effective change, once per changed aspect.
    pub changed: Signal<QueryChange>,
}

impl<F, S> QueryDescriptor<F, S>
where
    F: Clone + PartialEq + Send + Sync + 'static,
    S: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a descriptor with initial parameters.
    pub fn new(params: QueryParams<F, S>) -> Self {
        Self {
            params: RwLock::new(params),
            changed: Signal::new(),
        }
    }

    /// Snapshot the current parameters.
    pub fn params(&self) -> QueryParams<F, S> {
        self.params.read().clone()
    }

    /// The current filter expression.
    pub fn filter(&self) -> Option<F> {
        self.params.read().filter.clone()
    }

    /// The current sort order.
    pub fn sort(&self) -> Option<S> {
        self.params.read().sort.clone()
    }

    /// The current result limit.
    pub fn max_results(&self) -> Option<u64> {
        self.params.read().max_results
    }

    /// Set the filter. Returns `true` and notifies if it changed.
    pub fn set_filter(&self, filter: Option<F>) -> bool {
        let changed = {
            let mut params = self.params.write();
            if params.filter != filter {
                params.filter = filter;
                true
            } else {
                false
            }
        };
        if changed {
            self.changed.emit(QueryChange::Filter);
        }
        changed
    }

    /// Set the sort order. Returns `true` and notifies if it changed.
    pub fn set_sort(&self, sort: Option<S>) -> bool {
        let changed = {
            let mut params = self.params.write();
            if params.sort != sort {
                params.sort = sort;
                true
            } else {
                false
            }
        };
        if changed {
            self.changed.emit(QueryChange::Sort);
        }
        changed
    }

    /// Set the result limit. Returns `true` and notifies if it changed.
    pub fn set_max_results(&self, max_results: Option<u64>) -> bool {
        let changed = {
            let mut params = self.params.write();
            if params.max_results != max_results {
                params.max_results = max_results;
                true
            } else {
                false
            }
        };
        if changed {
            self.changed.emit(QueryChange::MaxResults);
        }
        changed
    }

    /// Replace all parameters at once.
    ///
    /// Notifications are sent after the new parameters are in place, one per
    /// changed aspect, in filter, sort, limit order.
    pub fn set_params(&self, new: QueryParams<F, S>) -> Vec<QueryChange> {
        let mut changes = Vec::new();
        {
            let mut params = self.params.write();
            if params.filter != new.filter {
                changes.push(QueryChange::Filter);
            }
            if params.sort != new.sort {
                changes.push(QueryChange::Sort);
            }
            if params.max_results != new.max_results {
                changes.push(QueryChange::MaxResults);
            }
            *params = new;
        }
        for change in &changes {
            self.changed.emit(*change);
        }
        changes
    }

    /// Connect `slot` to [`changed`](Self::changed) for the lifetime of the
    /// returned guard.
    pub fn watch<Slot>(self: &Arc<Self>, slot: Slot) -> QueryWatch<F, S>
    where
        Slot: Fn(&QueryChange) + Send + Sync + 'static,
    {
        let id = self.changed.connect(slot);
        QueryWatch {
            query: Arc::downgrade(self),
            id,
        }
    }
}

impl<F: fmt::Debug, S: fmt::Debug> fmt::Debug for QueryDescriptor<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDescriptor")
            .field("params", &*self.params.read())
            .finish()
    }
}

/// Disconnects a query change slot when dropped.
pub struct QueryWatch<F, S> {
    query: Weak<QueryDescriptor<F, S>>,
    id: ConnectionId,
}

impl<F, S> Drop for QueryWatch<F, S> {
    fn drop(&mut self) {
        if let Some(query) = self.query.upgrade() {
            query.changed.disconnect(self.id);
        }
    }
}
