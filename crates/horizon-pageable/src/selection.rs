//! Selections over query results.
//!
//! A [`Selection`] is an immutable value with two representations:
//!
//! - **Explicit**: exactly the listed ids, in selection order.
//! - **Inverted**: every item matching a frozen query snapshot except the
//!   listed ids. "All 2,000,000 rows but these 3" costs three ids of memory.
//!
//! Either kind can additionally carry transient items: locally added items
//! the backend does not know yet. They are matched by id like any other item
//! and are yielded after the persistent part when iterating.
//!
//! Deriving operations ([`with_id`](Selection::with_id),
//! [`inverted`](Selection::inverted), ...) return a new selection; the old one
//! stays valid. The [`SelectionHandler`](crate::SelectionHandler) publishes
//! them to observers.
//!
//! # Example
//!
//! ```ignore
//! let all_but_one = Selection::inverted(source, query.params(), [7]);
//! assert!(!all_but_one.contains_id(&7));
//! assert_eq!(all_but_one.size()?, total - 1);
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::{Memo, PerfSpan};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_ID_BLOCK_SIZE;
use crate::error::{PageableError, Result};
use crate::query::FilterExpr;
use crate::service::{order_by_ids, ParamsOf, QueryService};
use crate::source::ItemSource;

/// What iteration does with an explicitly selected id that no longer has an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Log the id and continue.
    #[default]
    Skip,
    /// Yield [`PageableError::NoItemForId`] and stop.
    Fail,
}

/// The representation of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// Exactly the listed ids.
    Explicit,
    /// Everything matching a query except the listed ids.
    Inverted,
}

enum Repr<S: QueryService> {
    Explicit {
        ids: Vec<S::Id>,
        members: HashSet<S::Id>,
    },
    Inverted {
        query: ParamsOf<S>,
        excluded: HashSet<S::Id>,
        // Ids the query filters out locally; never contained, never counted.
        hidden: HashSet<S::Id>,
    },
}

impl<S: QueryService> Clone for Repr<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Explicit { ids, members } => Self::Explicit {
                ids: ids.clone(),
                members: members.clone(),
            },
            Self::Inverted { query, excluded, hidden } => Self::Inverted {
                query: query.clone(),
                excluded: excluded.clone(),
                hidden: hidden.clone(),
            },
        }
    }
}

impl<S: QueryService> Repr<S> {
    fn explicit(ids: impl IntoIterator<Item = S::Id>) -> Self {
        let mut members = HashSet::new();
        let ids = ids.into_iter().filter(|id| members.insert(id.clone())).collect();
        Self::Explicit { ids, members }
    }
}

/// An immutable selection of items.
pub struct Selection<S: QueryService> {
    repr: Repr<S>,
    transient: Vec<(S::Id, S::Item)>,
    // Ids of locally added items; their membership is decided by `transient`.
    local: HashSet<S::Id>,
    source: Arc<dyn ItemSource<S>>,
    gaps: GapPolicy,
    block_size: usize,
    count: Memo<u64>,
}

impl<S: QueryService> Selection<S> {
    /// The empty explicit selection.
    pub fn empty(source: Arc<dyn ItemSource<S>>) -> Self {
        Self::explicit(source, [])
    }

    /// Select exactly `ids`. Duplicates are dropped, first occurrence wins.
    pub fn explicit(source: Arc<dyn ItemSource<S>>, ids: impl IntoIterator<Item = S::Id>) -> Self {
        Self::from_parts(source, Repr::explicit(ids))
    }

    /// Select everything matching `query` except `excluded`.
    ///
    /// `query` is a snapshot; later changes to the descriptor it came from do
    /// not affect the selection.
    pub fn inverted(
        source: Arc<dyn ItemSource<S>>,
        query: ParamsOf<S>,
        excluded: impl IntoIterator<Item = S::Id>,
    ) -> Self {
        Self::from_parts(
            source,
            Repr::Inverted {
                query,
                excluded: excluded.into_iter().collect(),
                hidden: HashSet::new(),
            },
        )
    }

    /// Mark `ids` as filtered out of an inverted selection's query.
    ///
    /// A collection hides locally removed items through its query filter;
    /// marking them keeps [`contains_id`](Self::contains_id) in line with the
    /// rows the query yields. Explicit selections are returned unchanged.
    pub fn with_hidden_ids(mut self, ids: impl IntoIterator<Item = S::Id>) -> Self {
        if let Repr::Inverted { hidden, .. } = &mut self.repr {
            hidden.extend(ids);
        }
        self
    }

    fn from_parts(source: Arc<dyn ItemSource<S>>, repr: Repr<S>) -> Self {
        Self {
            repr,
            transient: Vec::new(),
            local: HashSet::new(),
            source,
            gaps: GapPolicy::default(),
            block_size: DEFAULT_ID_BLOCK_SIZE,
            count: Memo::new(),
        }
    }

    /// A selection sharing source and settings with `self`.
    fn derive(&self, repr: Repr<S>, transient: Vec<(S::Id, S::Item)>) -> Self {
        Self {
            repr,
            transient,
            local: self.local.clone(),
            source: self.source.clone(),
            gaps: self.gaps,
            block_size: self.block_size,
            count: Memo::new(),
        }
    }

    /// Also select the locally added `items`.
    pub fn with_transient(mut self, items: impl IntoIterator<Item = S::Item>) -> Self {
        for item in items {
            let id = self.source.service().id_for_item(&item);
            if self.local.insert(id.clone()) || !self.is_transient(&id) {
                self.transient.push((id, item));
            }
        }
        self
    }

    /// Set the gap policy used by [`iter`](Self::iter).
    pub fn with_gap_policy(mut self, gaps: GapPolicy) -> Self {
        self.gaps = gaps;
        self
    }

    /// Set how many ids (or rows) iteration resolves per backend call.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// The representation.
    pub fn kind(&self) -> SelectionKind {
        match self.repr {
            Repr::Explicit { .. } => SelectionKind::Explicit,
            Repr::Inverted { .. } => SelectionKind::Inverted,
        }
    }

    /// Returns `true` for an inverted selection.
    pub fn is_inverted(&self) -> bool {
        self.kind() == SelectionKind::Inverted
    }

    /// The gap policy.
    pub fn gap_policy(&self) -> GapPolicy {
        self.gaps
    }

    /// The query snapshot of an inverted selection.
    pub fn query(&self) -> Option<&ParamsOf<S>> {
        match &self.repr {
            Repr::Inverted { query, .. } => Some(query),
            Repr::Explicit { .. } => None,
        }
    }

    /// The ids of an explicit selection, in selection order.
    pub fn selected_ids(&self) -> Option<&[S::Id]> {
        match &self.repr {
            Repr::Explicit { ids, .. } => Some(ids),
            Repr::Inverted { .. } => None,
        }
    }

    /// The excluded ids of an inverted selection.
    pub fn excluded_ids(&self) -> Option<&HashSet<S::Id>> {
        match &self.repr {
            Repr::Inverted { excluded, .. } => Some(excluded),
            Repr::Explicit { .. } => None,
        }
    }

    /// The selected locally added items.
    pub fn transient_items(&self) -> impl Iterator<Item = &S::Item> {
        self.transient.iter().map(|(_, item)| item)
    }

    /// Ids of the selected locally added items.
    pub fn transient_ids(&self) -> impl Iterator<Item = &S::Id> {
        self.transient.iter().map(|(id, _)| id)
    }

    fn is_transient(&self, id: &S::Id) -> bool {
        self.transient.iter().any(|(known, _)| known == id)
    }

    /// Returns `true` if the item with `id` is selected.
    ///
    /// For an inverted selection this does not ask the backend whether the
    /// item matches the query snapshot; only ids marked hidden are known not to.
    pub fn contains_id(&self, id: &S::Id) -> bool {
        if self.is_transient(id) {
            return true;
        }
        if self.local.contains(id) {
            return false;
        }
        match &self.repr {
            Repr::Explicit { members, .. } => members.contains(id),
            Repr::Inverted { excluded, hidden, .. } => !excluded.contains(id) && !hidden.contains(id),
        }
    }

    /// Returns `true` if `item` is selected.
    pub fn contains(&self, item: &S::Item) -> bool {
        self.contains_id(&self.source.service().id_for_item(item))
    }

    /// Number of selected items.
    ///
    /// An inverted selection costs one count query on first use; the count is
    /// kept for the lifetime of this instance.
    pub fn size(&self) -> Result<u64> {
        let persistent = match &self.repr {
            Repr::Explicit { ids, .. } => ids.len() as u64,
            Repr::Inverted { query, excluded, .. } => {
                let count = self.count.get_or_try_init(|| self.source.count(query))?;
                count.saturating_sub(excluded.len() as u64)
            }
        };
        Ok(persistent + self.transient.len() as u64)
    }

    /// Returns `true` if the persistent item `id` is covered by this selection.
    ///
    /// Unlike [`contains_id`](Self::contains_id) this checks an inverted
    /// selection's query snapshot, at the cost of up to two count queries.
    /// The snapshot count is shared with [`size`](Self::size).
    pub fn snapshot_contains_id(&self, id: &S::Id) -> Result<bool> {
        match &self.repr {
            Repr::Explicit { members, .. } => Ok(members.contains(id)),
            Repr::Inverted { query, .. } => {
                let total = *self.count.get_or_try_init(|| self.source.count(query))?;
                let without = <S::Filter as FilterExpr<S::Id>>::exclude_ids(query.filter(), std::slice::from_ref(id));
                let remaining = self.source.count(&query.clone().replace_filter(Some(without)))?;
                Ok(remaining < total)
            }
        }
    }

    /// Returns `true` if nothing is selected.
    pub fn is_empty(&self) -> Result<bool> {
        match &self.repr {
            Repr::Explicit { ids, .. } => Ok(ids.is_empty() && self.transient.is_empty()),
            Repr::Inverted { .. } => Ok(self.size()? == 0),
        }
    }

    /// Returns a selection with the persistent item `id` selected (`on`) or not.
    pub fn with_id(&self, id: S::Id, on: bool) -> Self {
        let repr = match &self.repr {
            Repr::Explicit { ids, .. } => {
                if on {
                    Repr::explicit(ids.iter().cloned().chain(std::iter::once(id)))
                } else {
                    Repr::explicit(ids.iter().filter(|known| **known != id).cloned())
                }
            }
            Repr::Inverted { query, excluded, hidden } => {
                let mut excluded = excluded.clone();
                if on {
                    excluded.remove(&id);
                } else if !hidden.contains(&id) {
                    excluded.insert(id);
                }
                Repr::Inverted {
                    query: query.clone(),
                    excluded,
                    hidden: hidden.clone(),
                }
            }
        };
        self.derive(repr, self.transient.clone())
    }

    /// Returns a selection with the locally added `item` selected (`on`) or not.
    pub fn with_transient_item(&self, item: S::Item, on: bool) -> Self {
        let id = self.source.service().id_for_item(&item);
        let mut transient: Vec<_> = self
            .transient
            .iter()
            .filter(|(known, _)| *known != id)
            .cloned()
            .collect();
        let mut selection = self.derive(self.repr.clone(), Vec::new());
        selection.local.insert(id.clone());
        if on {
            transient.push((id, item));
        }
        selection.transient = transient;
        selection
    }

    /// Returns the complement of this selection.
    ///
    /// Explicit ids become the exclusions of an inverted selection over
    /// `current_query`, and vice versa. Transient items flip against
    /// `added_items`: selected ones are dropped, unselected ones are added.
    pub fn inverted_against(&self, current_query: &ParamsOf<S>, added_items: &[S::Item]) -> Self {
        let repr = match &self.repr {
            Repr::Explicit { ids, .. } => Repr::Inverted {
                query: current_query.clone(),
                excluded: ids.iter().cloned().collect(),
                hidden: HashSet::new(),
            },
            // Order of an excluded set is arbitrary; explicit ids keep it.
            Repr::Inverted { excluded, .. } => Repr::explicit(excluded.iter().cloned()),
        };
        let service = self.source.service();
        let added: Vec<(S::Id, S::Item)> = added_items
            .iter()
            .map(|item| (service.id_for_item(item), item.clone()))
            .collect();
        let mut selection = self.derive(repr, Vec::new());
        selection.local.extend(added.iter().map(|(id, _)| id.clone()));
        selection.transient = added
            .into_iter()
            .filter(|(id, _)| !self.is_transient(id))
            .collect();
        selection
    }

    /// Returns this selection with `ids` no longer selected.
    ///
    /// For an inverted selection the ids join the exclusions, so the frozen
    /// query no longer counts them.
    pub fn without_ids(&self, ids: &HashSet<S::Id>) -> Self {
        let repr = match &self.repr {
            Repr::Explicit { ids: selected, .. } => {
                Repr::explicit(selected.iter().filter(|id| !ids.contains(id)).cloned())
            }
            Repr::Inverted { query, excluded, hidden } => Repr::Inverted {
                query: query.clone(),
                excluded: excluded.union(ids).filter(|id| !hidden.contains(*id)).cloned().collect(),
                hidden: hidden.clone(),
            },
        };
        let transient = self
            .transient
            .iter()
            .filter(|(id, _)| !ids.contains(id))
            .cloned()
            .collect();
        self.derive(repr, transient)
    }

    /// Returns `true` if both selections select the same items.
    ///
    /// Explicit selections compare their id sets, inverted ones their query
    /// snapshot and exclusions. Comparing an explicit with an inverted
    /// selection would need a full scan and is refused.
    pub fn same_as(&self, other: &Self) -> Result<bool> {
        let persistent = match (&self.repr, &other.repr) {
            (Repr::Explicit { members: a, .. }, Repr::Explicit { members: b, .. }) => a == b,
            (
                Repr::Inverted {
                    query: qa,
                    excluded: ea,
                    ..
                },
                Repr::Inverted {
                    query: qb,
                    excluded: eb,
                    ..
                },
            ) => qa == qb && ea == eb,
            _ => {
                return Err(PageableError::unsupported(
                    "cannot compare an explicit selection with an inverted one",
                ));
            }
        };
        let mine: HashSet<&S::Id> = self.transient_ids().collect();
        let theirs: HashSet<&S::Id> = other.transient_ids().collect();
        Ok(persistent && mine == theirs)
    }

    /// Iterate the selected items: persistent items first, then transient ones.
    ///
    /// The iterator is lazy and fetches `block_size` items per backend call.
    /// Calling `iter` again starts over.
    pub fn iter(&self) -> SelectionIter<'_, S> {
        SelectionIter {
            selection: self,
            buffer: VecDeque::new(),
            cursor: 0,
            persistent_done: false,
            pending: None,
            failed: false,
            transient_pos: 0,
        }
    }
}

impl<S: QueryService> Clone for Selection<S> {
    fn clone(&self) -> Self {
        let copy = self.derive(self.repr.clone(), self.transient.clone());
        if let Some(count) = self.count.get() {
            copy.count.set(*count);
        }
        copy
    }
}

impl<S: QueryService> fmt::Debug for Selection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Selection");
        match &self.repr {
            Repr::Explicit { ids, .. } => debug.field("ids", ids),
            Repr::Inverted { query, excluded, .. } => debug.field("query", query).field("excluded", excluded),
        };
        debug
            .field("transient", &self.transient.len())
            .field("gaps", &self.gaps)
            .finish()
    }
}

/// Lazy iterator over a [`Selection`]. Yields `Err` at most once, then ends.
pub struct SelectionIter<'a, S: QueryService> {
    selection: &'a Selection<S>,
    buffer: VecDeque<S::Item>,
    cursor: u64,
    persistent_done: bool,
    pending: Option<PageableError>,
    failed: bool,
    transient_pos: usize,
}

impl<S: QueryService> SelectionIter<'_, S> {
    fn fill(&mut self) -> Result<()> {
        let selection = self.selection;
        let block = selection.block_size;
        match &selection.repr {
            Repr::Explicit { ids, .. } => {
                let start = usize::try_from(self.cursor).unwrap_or(usize::MAX).min(ids.len());
                let end = start.saturating_add(block).min(ids.len());
                self.cursor = end as u64;
                if end == ids.len() {
                    self.persistent_done = true;
                }
                let chunk = &ids[start..end];
                if chunk.is_empty() {
                    return Ok(());
                }

                let service = selection.source.service();
                let items = {
                    let _span = PerfSpan::new("items_for_ids");
                    service.items_for_ids(chunk)?
                };
                for (id, item) in chunk.iter().zip(order_by_ids(service.as_ref(), chunk, items)) {
                    match (item, selection.gaps) {
                        (Some(item), _) => self.buffer.push_back(item),
                        (None, GapPolicy::Skip) => tracing::warn!(
                            target: targets::SELECTION,
                            ?id,
                            "skipping selected id without item"
                        ),
                        (None, GapPolicy::Fail) => {
                            self.pending = Some(PageableError::no_item_for_id(id));
                            self.persistent_done = true;
                            break;
                        }
                    }
                }
            }
            Repr::Inverted { query, excluded, .. } => {
                let window = selection.source.window(query, self.cursor, block)?;
                self.cursor += block as u64;
                self.persistent_done = window.exhausted;
                let service = selection.source.service();
                self.buffer.extend(
                    window
                        .items
                        .into_iter()
                        .filter(|item| !excluded.contains(&service.id_for_item(item))),
                );
            }
        }
        Ok(())
    }
}

impl<S: QueryService> Iterator for SelectionIter<'_, S> {
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if let Some(err) = self.pending.take() {
                self.failed = true;
                return Some(Err(err));
            }
            if self.persistent_done {
                break;
            }
            if let Err(err) = self.fill() {
                self.failed = true;
                return Some(Err(err));
            }
        }

        let (_, item) = self.selection.transient.get(self.transient_pos)?;
        self.transient_pos += 1;
        Some(Ok(item.clone()))
    }
}
