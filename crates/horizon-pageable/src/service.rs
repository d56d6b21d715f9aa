//! Backing query service contracts.
//!
//! The engine never executes queries itself. It consumes one of two backend
//! contracts, both built on [`QueryService`]:
//!
//! - [`PageQueryService`]: returns items for a window of the query result.
//! - [`IdQueryService`]: returns matching ids for a window, then items for ids.
//!
//! Implementations are blocking; every call runs to completion or fails.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::Result;
use crate::query::{FilterExpr, QueryDescriptor, QueryParams};

/// Query parameters for a service's filter and sort types.
pub type ParamsOf<S> = QueryParams<<S as QueryService>::Filter, <S as QueryService>::Sort>;

/// Query descriptor for a service's filter and sort types.
pub type QueryOf<S> = QueryDescriptor<<S as QueryService>::Filter, <S as QueryService>::Sort>;

/// Operations shared by both backend contracts.
pub trait QueryService: Send + Sync + 'static {
    /// The item type. Items may be transient; identity is the id.
    type Item: Clone + Send + Sync + 'static;
    /// The externally meaningful item id.
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// The filter expression type.
    type Filter: FilterExpr<Self::Id>;
    /// The sort order type.
    type Sort: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Returns the id of an item.
    fn id_for_item(&self, item: &Self::Item) -> Self::Id;

    /// Returns the item for an id, or `None` if it does not exist (any more).
    fn item_for_id(&self, id: &Self::Id) -> Result<Option<Self::Item>>;

    /// Returns the number of items matching the query filter.
    fn item_count(&self, query: &QueryParams<Self::Filter, Self::Sort>) -> Result<u64>;

    /// Returns the items for a set of ids, in any order, omitting unknown ids.
    ///
    /// The default resolves ids one by one; id-based backends should answer
    /// with a single round trip.
    fn items_for_ids(&self, ids: &[Self::Id]) -> Result<Vec<Self::Item>> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.item_for_id(id)? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

/// A backend that returns result windows directly.
pub trait PageQueryService: QueryService {
    /// Returns at most `page_size` items of the query result, starting at `start`.
    fn items(
        &self,
        query: &QueryParams<Self::Filter, Self::Sort>,
        start: u64,
        page_size: usize,
    ) -> Result<Vec<Self::Item>>;
}

/// A backend that returns matching ids, then items for ids.
pub trait IdQueryService: QueryService {
    /// Returns the ids of the query result starting at `start`.
    ///
    /// With `limit == None` every remaining id is returned.
    fn find_ids(
        &self,
        query: &QueryParams<Self::Filter, Self::Sort>,
        start: u64,
        limit: Option<usize>,
    ) -> Result<Vec<Self::Id>>;
}

/// Sorts `items` into the order of `ids`, keeping a `None` gap for every id
/// without an item.
pub fn order_by_ids<S: QueryService>(
    service: &S,
    ids: &[S::Id],
    items: Vec<S::Item>,
) -> Vec<Option<S::Item>> {
    let mut by_id: HashMap<S::Id, S::Item> = items
        .into_iter()
        .map(|item| (service.id_for_item(&item), item))
        .collect();
    ids.iter().map(|id| by_id.remove(id)).collect()
}

/// Resolves `ids` in order and drops ids that no longer have an item.
///
/// Every dropped id is logged; during bulk reads a vanished row is treated as
/// a concurrent external deletion, not an error.
pub fn resolve_ids_skipping_gaps<S: QueryService>(service: &S, ids: &[S::Id]) -> Result<Vec<S::Item>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let items = {
        let _span = horizon_pageable_core::PerfSpan::new("items_for_ids");
        service.items_for_ids(ids)?
    };
    let ordered = order_by_ids(service, ids, items);
    let mut resolved = Vec::with_capacity(ordered.len());
    for (id, item) in ids.iter().zip(ordered) {
        match item {
            Some(item) => resolved.push(item),
            None => tracing::warn!(
                target: horizon_pageable_core::logging::targets::STRATEGY,
                ?id,
                "skipping id without item, probably deleted concurrently"
            ),
        }
    }
    Ok(resolved)
}
