//! Query strategies.
//!
//! A [`QueryStrategy`] turns one of the two backend contracts into counts,
//! windows and point lookups for the collection facade:
//!
//! - [`IdStrategy`] loads the full id list of the query once (size guarded)
//!   and resolves windows of it.
//! - [`PageStrategy`] never materializes ids; it reads windows and counts
//!   through a [`CachingQueryService`](crate::cache::CachingQueryService).
//!
//! The facade only sees the trait, so both are interchangeable and chosen at
//! construction.

mod id;
mod page;

use std::collections::HashSet;
use std::sync::Arc;

pub use id::IdStrategy;
pub use page::PageStrategy;

use crate::error::Result;
use crate::query::QueryChange;
use crate::service::{ParamsOf, QueryService};
use crate::source::ItemSource;

/// Which backend contract a strategy is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// `find_ids` + `items_for_ids`.
    IdBased,
    /// `items` for a window.
    PageBased,
}

/// Counts, windows and lookups over the query-backed rows of a collection.
///
/// Every `query` passed in is the effective query: the collection's
/// descriptor with locally removed ids filtered out.
pub trait QueryStrategy<S: QueryService>: Send + Sync {
    /// The backend contract.
    fn kind(&self) -> StrategyKind;

    /// An uncached reader for the same backend, used by selections.
    fn source(&self) -> Arc<dyn ItemSource<S>>;

    /// Number of query-backed rows.
    ///
    /// Fails with `MaxResultsExceeded` if the query has a result limit and
    /// matches more rows.
    fn item_count(&self, query: &ParamsOf<S>) -> Result<u64>;

    /// At most `size` rows starting at absolute position `start`.
    ///
    /// Rows deleted concurrently may be skipped, so the window can come back
    /// short.
    fn window(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<Vec<S::Item>>;

    /// The row at absolute position `index`, `None` past the end.
    fn item_at(&self, query: &ParamsOf<S>, index: u64) -> Result<Option<S::Item>>;

    /// The item for `id`, `None` if it does not exist.
    fn item_for_id(&self, id: &S::Id) -> Result<Option<S::Item>>;

    /// The descriptor changed.
    fn query_changed(&self, change: QueryChange);

    /// `ids` were removed locally; `query_after` already excludes them.
    fn items_removed(&self, ids: &HashSet<S::Id>, query_after: &ParamsOf<S>);

    /// Drop every cached value. Returns `true` if anything was cached.
    fn clear_caches(&self) -> bool;
}
