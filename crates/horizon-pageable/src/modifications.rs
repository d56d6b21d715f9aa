//! Local modification tracking.
//!
//! A [`ModificationHandler`] records what the user changed since the last
//! save, on top of query results the backend does not reflect yet:
//!
//! - **added**: new items, in insertion order, shown after the query rows;
//! - **updated**: persistent items with unsaved changes;
//! - **removed**: ids of persistent items, hidden from query results through
//!   [`removed_items_filter`](ModificationHandler::removed_items_filter).
//!
//! The three sets stay disjoint: removing an added item forgets it and
//! removed items are never "updated". Re-adding a removed persistent item
//! restores it in place: the query shows it again and the given copy is kept
//! as its unsaved update, so it is never listed twice.
//!
//! The ledger never talks to the backend. The owner persists the changes,
//! then calls [`clear`](ModificationHandler::clear) and the collection's
//! `clear_caches()`.

use std::collections::HashSet;
use std::sync::Arc;

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::{Signal, VetoSignal};
use parking_lot::RwLock;

use crate::error::{PageableError, Result};
use crate::query::FilterExpr;
use crate::selection::Selection;
use crate::service::QueryService;
use crate::source::ItemSource;

/// Ids dropped by one [`ModificationHandler::remove_selected`] call.
pub struct RemovedItems<S: QueryService> {
    /// Persistent ids, now part of the removed set.
    pub persistent: HashSet<S::Id>,
    /// Ids of added items that were forgotten.
    pub transient: HashSet<S::Id>,
}

impl<S: QueryService> RemovedItems<S> {
    /// Every removed id.
    pub fn all(&self) -> HashSet<S::Id> {
        self.persistent.union(&self.transient).cloned().collect()
    }
}

/// A snapshot of all local modifications.
pub struct Modifications<S: QueryService> {
    /// Added items in insertion order.
    pub added: Vec<S::Item>,
    /// Updated persistent items.
    pub updated: Vec<S::Item>,
    /// Removed persistent items, as an explicit selection.
    pub removed: Selection<S>,
}

impl<S: QueryService> Modifications<S> {
    /// Returns `true` if anything was added, updated or removed.
    pub fn is_modified(&self) -> bool {
        !self.added.is_empty()
            || !self.updated.is_empty()
            || self.removed.selected_ids().is_some_and(|ids| !ids.is_empty())
    }
}

struct Ledger<S: QueryService> {
    added: Vec<(S::Id, S::Item)>,
    updated: Vec<(S::Id, S::Item)>,
    removed: Vec<S::Id>,
}

impl<S: QueryService> Default for Ledger<S> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<S: QueryService> Ledger<S> {
    fn is_added(&self, id: &S::Id) -> bool {
        self.added.iter().any(|(known, _)| known == id)
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Tracks added, updated and removed items of one collection.
///
/// # Signals
///
/// - `removal_about_to_happen(Selection)`: before a removal, vetoable
/// - `items_removed(RemovedItems)`: after a removal
/// - `changed(())`: after any change to the ledger
pub struct ModificationHandler<S: QueryService> {
    source: Arc<dyn ItemSource<S>>,
    max_removed_ids: usize,
    ledger: RwLock<Ledger<S>>,

    /// Announced before a removal; any slot returning `false` vetoes it.
    pub removal_about_to_happen: VetoSignal<Selection<S>>,
    /// Emitted after items were removed.
    pub items_removed: Signal<RemovedItems<S>>,
    /// Emitted after any change.
    pub changed: Signal<()>,
}

impl<S: QueryService> ModificationHandler<S> {
    /// Create an empty ledger tracking at most `max_removed_ids` removed ids.
    pub fn new(source: Arc<dyn ItemSource<S>>, max_removed_ids: usize) -> Self {
        Self {
            source,
            max_removed_ids,
            ledger: RwLock::new(Ledger::default()),
            removal_about_to_happen: VetoSignal::new(),
            items_removed: Signal::new(),
            changed: Signal::new(),
        }
    }

    fn id_of(&self, item: &S::Item) -> S::Id {
        self.source.service().id_for_item(item)
    }

    /// Append a new item.
    ///
    /// Adding an item whose id was removed restores the persistent item
    /// instead and records `item` as its update; adding an id that is
    /// already added replaces the stored item.
    pub fn add_item(&self, item: S::Item) {
        let id = self.id_of(&item);
        let restored = {
            let mut ledger = self.ledger.write();
            match ledger.removed.iter().position(|removed| *removed == id) {
                Some(position) => {
                    ledger.removed.remove(position);
                    match ledger.updated.iter().position(|(known, _)| *known == id) {
                        Some(position) => ledger.updated[position].1 = item,
                        None => ledger.updated.push((id, item)),
                    }
                    true
                }
                None => {
                    match ledger.added.iter().position(|(known, _)| *known == id) {
                        Some(position) => ledger.added[position].1 = item,
                        None => ledger.added.push((id, item)),
                    }
                    false
                }
            }
        };
        tracing::debug!(target: targets::MODIFICATIONS, restored, "item added");
        self.changed.emit(());
    }

    /// Record that `item` has (`changed`) or no longer has unsaved changes.
    ///
    /// Added items are already tracked as a whole; their stored copy is
    /// replaced instead. Removed items are ignored.
    pub fn update_item(&self, item: S::Item, changed: bool) {
        let id = self.id_of(&item);
        let modified = {
            let mut ledger = self.ledger.write();
            if ledger.removed.contains(&id) {
                false
            } else if let Some(position) = ledger.added.iter().position(|(known, _)| *known == id) {
                ledger.added[position].1 = item;
                true
            } else {
                let position = ledger.updated.iter().position(|(known, _)| *known == id);
                match (position, changed) {
                    (Some(position), true) => {
                        ledger.updated[position].1 = item;
                        true
                    }
                    (None, true) => {
                        ledger.updated.push((id, item));
                        true
                    }
                    (Some(position), false) => {
                        ledger.updated.remove(position);
                        true
                    }
                    (None, false) => false,
                }
            }
        };
        if modified {
            self.changed.emit(());
        }
    }

    /// Remove the items of `selection`.
    ///
    /// Added items are forgotten; persistent ids join the removed set. An
    /// inverted selection is enumerated, which is only allowed while it is
    /// no larger than the removed-id ceiling.
    ///
    /// Returns `Ok(false)` if an observer vetoed the removal. Fails without
    /// changing anything if the removed set would exceed the ceiling.
    pub fn remove_selected(&self, selection: &Selection<S>) -> Result<bool> {
        if !self.removal_about_to_happen.request(selection) {
            tracing::debug!(target: targets::MODIFICATIONS, "removal vetoed");
            return Ok(false);
        }

        let candidates = self.selected_ids(selection)?;

        let removed = {
            let mut ledger = self.ledger.write();
            let mut persistent = Vec::new();
            let mut seen = HashSet::new();
            let mut transient = HashSet::new();
            for id in candidates {
                if ledger.is_added(&id) {
                    transient.insert(id);
                } else if !ledger.removed.contains(&id) && seen.insert(id.clone()) {
                    persistent.push(id);
                }
            }

            let total = ledger.removed.len() + persistent.len();
            if total > self.max_removed_ids {
                return Err(PageableError::max_results_exceeded(
                    self.max_removed_ids as u64,
                    Some(total as u64),
                ));
            }

            ledger.added.retain(|(id, _)| !transient.contains(id));
            ledger.updated.retain(|(id, _)| !seen.contains(id));
            ledger.removed.extend(persistent);
            RemovedItems {
                persistent: seen,
                transient,
            }
        };

        if removed.persistent.is_empty() && removed.transient.is_empty() {
            return Ok(true);
        }
        tracing::debug!(
            target: targets::MODIFICATIONS,
            persistent = removed.persistent.len(),
            transient = removed.transient.len(),
            "items removed"
        );
        self.items_removed.emit(removed);
        self.changed.emit(());
        Ok(true)
    }

    fn selected_ids(&self, selection: &Selection<S>) -> Result<Vec<S::Id>> {
        let mut ids: Vec<S::Id> = selection.transient_ids().cloned().collect();
        match selection.selected_ids() {
            Some(selected) => ids.extend(selected.iter().cloned()),
            None => {
                let size = selection.size()?;
                if size > self.max_removed_ids as u64 {
                    return Err(PageableError::unsupported(format!(
                        "cannot remove an inverted selection of {size} items, the limit is {}",
                        self.max_removed_ids
                    )));
                }
                for item in selection.iter() {
                    ids.push(self.id_of(&item?));
                }
            }
        }
        Ok(ids)
    }

    /// `base AND NOT (id IN removed)`, or `base` when nothing is removed.
    pub fn removed_items_filter(&self, base: Option<&S::Filter>) -> Option<S::Filter> {
        let ledger = self.ledger.read();
        if ledger.removed.is_empty() {
            return base.cloned();
        }
        Some(<S::Filter as FilterExpr<S::Id>>::exclude_ids(base, &ledger.removed))
    }

    /// Forget every modification. The backend is not touched.
    pub fn clear(&self) {
        let was_modified = {
            let mut ledger = self.ledger.write();
            let was_modified = !ledger.is_empty();
            *ledger = Ledger::default();
            was_modified
        };
        if was_modified {
            self.changed.emit(());
        }
    }

    /// Added items in insertion order.
    pub fn added_items(&self) -> Vec<S::Item> {
        self.ledger.read().added.iter().map(|(_, item)| item.clone()).collect()
    }

    /// Number of added items.
    pub fn added_count(&self) -> usize {
        self.ledger.read().added.len()
    }

    /// Returns `true` if `id` belongs to an added item.
    pub fn is_added(&self, id: &S::Id) -> bool {
        self.ledger.read().is_added(id)
    }

    /// Updated persistent items.
    pub fn updated_items(&self) -> Vec<S::Item> {
        self.ledger.read().updated.iter().map(|(_, item)| item.clone()).collect()
    }

    /// Removed persistent ids, in removal order.
    pub fn removed_ids(&self) -> Vec<S::Id> {
        self.ledger.read().removed.clone()
    }

    /// Returns `true` if anything was added, updated or removed.
    pub fn is_modified(&self) -> bool {
        !self.ledger.read().is_empty()
    }

    /// Snapshot all modifications.
    pub fn modifications(&self) -> Modifications<S> {
        let ledger = self.ledger.read();
        Modifications {
            added: ledger.added.iter().map(|(_, item)| item.clone()).collect(),
            updated: ledger.updated.iter().map(|(_, item)| item.clone()).collect(),
            removed: Selection::explicit(self.source.clone(), ledger.removed.iter().cloned()),
        }
    }
}
