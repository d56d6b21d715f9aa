//! Vetoable selection management.
//!
//! [`SelectionHandler`] owns the current [`Selection`] of a collection and is
//! the only way to change it. Every change follows the same sequence:
//!
//! 1. compute the new selection from the current one,
//! 2. announce it on [`selection_about_to_change`](SelectionHandler::selection_about_to_change),
//!    where any observer may veto it,
//! 3. swap it in and emit [`selection_changed`](SelectionHandler::selection_changed).
//!
//! A vetoed change leaves the current selection untouched and the operation
//! returns `false`.
//!
//! # Signals
//!
//! - `selection_about_to_change(SelectionChange)`: before commit, vetoable
//! - `selection_changed(SelectionChange)`: after commit

use std::sync::Arc;

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::{Property, Signal, VetoSignal};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::PageableConfig;
use crate::error::Result;
use crate::selection::{GapPolicy, Selection};
use crate::service::{ParamsOf, QueryOf, QueryService};
use crate::source::ItemSource;

/// Which selection operations a handler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    /// Nothing can be selected.
    NoSelection,
    /// At most one item is selected; selecting another replaces it.
    Single,
    /// Any number of items, including select-all and inversion.
    #[default]
    Multi,
}

/// The selections before and after a change.
pub struct SelectionChange<S: QueryService> {
    /// The selection being replaced.
    pub old: Arc<Selection<S>>,
    /// The proposed (or committed) selection.
    pub new: Arc<Selection<S>>,
}

impl<S: QueryService> Clone for SelectionChange<S> {
    fn clone(&self) -> Self {
        Self {
            old: self.old.clone(),
            new: self.new.clone(),
        }
    }
}

type AddedItems<S> = Box<dyn Fn() -> Vec<<S as QueryService>::Item> + Send + Sync>;
type VisibleQueryProvider<S> = Box<dyn Fn() -> VisibleQuery<S> + Send + Sync>;

/// The query behind the rows a collection shows.
pub struct VisibleQuery<S: QueryService> {
    /// Parameters including any local filtering.
    pub params: ParamsOf<S>,
    /// Persistent ids the local filtering hides.
    pub hidden: Vec<S::Id>,
}

/// Holds and publishes the selection of one collection.
pub struct SelectionHandler<S: QueryService> {
    query: Arc<QueryOf<S>>,
    source: Arc<dyn ItemSource<S>>,
    mode: Property<SelectMode>,
    gaps: GapPolicy,
    block_size: usize,
    current: RwLock<Arc<Selection<S>>>,
    commit: ReentrantMutex<()>,
    added_items: RwLock<Option<AddedItems<S>>>,
    visible_query: RwLock<Option<VisibleQueryProvider<S>>>,

    /// Announced before a selection change; any slot returning `false` vetoes it.
    pub selection_about_to_change: VetoSignal<SelectionChange<S>>,
    /// Emitted after a selection change was committed.
    pub selection_changed: Signal<SelectionChange<S>>,
}

impl<S: QueryService> SelectionHandler<S> {
    /// Create a handler with an empty selection.
    ///
    /// `query` is the descriptor select-all and inversion freeze.
    pub fn new(query: Arc<QueryOf<S>>, source: Arc<dyn ItemSource<S>>, config: &PageableConfig) -> Self {
        let empty = Selection::empty(source.clone())
            .with_gap_policy(config.gap_policy)
            .with_block_size(config.id_block_size);
        Self {
            query,
            source,
            mode: Property::new(config.select_mode),
            gaps: config.gap_policy,
            block_size: config.id_block_size,
            current: RwLock::new(Arc::new(empty)),
            commit: ReentrantMutex::new(()),
            added_items: RwLock::new(None),
            visible_query: RwLock::new(None),
            selection_about_to_change: VetoSignal::new(),
            selection_changed: Signal::new(),
        }
    }

    /// Supply the locally added items, which select-all and inversion include.
    pub fn set_added_items_provider<F>(&self, provider: F)
    where
        F: Fn() -> Vec<S::Item> + Send + Sync + 'static,
    {
        *self.added_items.write() = Some(Box::new(provider));
    }

    fn added_items(&self) -> Vec<S::Item> {
        self.added_items
            .read()
            .as_ref()
            .map(|provider| provider())
            .unwrap_or_default()
    }

    /// Supply the query of the rows actually shown, which select-all and
    /// inversion freeze instead of the raw descriptor.
    ///
    /// A collection hides locally removed items through its filter; without
    /// this provider a select-all would still count them.
    pub fn set_visible_query_provider<F>(&self, provider: F)
    where
        F: Fn() -> VisibleQuery<S> + Send + Sync + 'static,
    {
        *self.visible_query.write() = Some(Box::new(provider));
    }

    fn visible_query(&self) -> VisibleQuery<S> {
        match self.visible_query.read().as_ref() {
            Some(provider) => provider(),
            None => VisibleQuery {
                params: self.query.params(),
                hidden: Vec::new(),
            },
        }
    }

    fn blank(&self) -> Selection<S> {
        Selection::empty(self.source.clone())
            .with_gap_policy(self.gaps)
            .with_block_size(self.block_size)
    }

    /// The current selection.
    pub fn selection(&self) -> Arc<Selection<S>> {
        self.current.read().clone()
    }

    /// The select mode.
    pub fn select_mode(&self) -> SelectMode {
        self.mode.get()
    }

    /// Change the select mode.
    ///
    /// Leaving [`SelectMode::Multi`] drops the current selection without
    /// asking observers, since it may not be representable in the new mode.
    pub fn set_select_mode(&self, mode: SelectMode) -> bool {
        if !self.mode.set(mode) {
            return false;
        }
        if mode != SelectMode::Multi {
            self.reset();
        }
        true
    }

    /// Returns `true` if `item` is selected.
    pub fn is_selected(&self, item: &S::Item) -> bool {
        self.current.read().contains(item)
    }

    /// Resolves every selected item.
    pub fn selected_items(&self) -> Result<Vec<S::Item>> {
        self.selection().iter().collect()
    }

    /// Select (`on`) or deselect `item`.
    ///
    /// In [`SelectMode::Single`] selecting replaces the previous selection.
    /// Deselecting an item that an inverted selection never covered is
    /// ignored, so its exclusion set stays within its query snapshot.
    pub fn select(&self, on: bool, item: &S::Item) -> bool {
        let mode = self.mode.get();
        if mode == SelectMode::NoSelection {
            tracing::debug!(target: targets::SELECTION, "select refused, selection disabled");
            return false;
        }

        let service = self.source.service();
        let id = service.id_for_item(item);
        let local = self
            .added_items()
            .iter()
            .any(|added| service.id_for_item(added) == id);
        if !on && !local && !self.covers(&id) {
            return false;
        }

        self.commit_with(true, |current| {
            let blank;
            let base = if on && mode == SelectMode::Single {
                blank = self.blank();
                &blank
            } else {
                current
            };
            if local {
                base.with_transient_item(item.clone(), on)
            } else {
                base.with_id(id, on)
            }
        })
    }

    /// Whether an inverted selection's snapshot holds `id`.
    ///
    /// Only asks the backend when the snapshot is not the visible query;
    /// rows on screen always match it.
    fn covers(&self, id: &S::Id) -> bool {
        let current = self.selection();
        match current.query() {
            Some(frozen) if *frozen != self.visible_query().params => match current.snapshot_contains_id(id) {
                Ok(true) => true,
                Ok(false) => {
                    tracing::debug!(target: targets::SELECTION, ?id, "deselect ignored, id outside selection snapshot");
                    false
                }
                Err(err) => {
                    tracing::warn!(target: targets::SELECTION, error = %err, "deselect refused, snapshot lookup failed");
                    false
                }
            },
            _ => true,
        }
    }

    /// Select everything matching the current query (`on`) or nothing.
    ///
    /// Refused unless the mode is [`SelectMode::Multi`].
    pub fn select_all(&self, on: bool) -> bool {
        if self.mode.get() != SelectMode::Multi {
            tracing::debug!(target: targets::SELECTION, on, "select all refused outside multi mode");
            return false;
        }
        if !on {
            return self.clear();
        }
        let visible = self.visible_query();
        let added = self.added_items();
        self.commit_with(true, |_| {
            Selection::inverted(self.source.clone(), visible.params, [])
                .with_hidden_ids(visible.hidden)
                .with_gap_policy(self.gaps)
                .with_block_size(self.block_size)
                .with_transient(added)
        })
    }

    /// Replace the selection with its complement over the current query.
    ///
    /// Refused unless the mode is [`SelectMode::Multi`].
    pub fn invert(&self) -> bool {
        if self.mode.get() != SelectMode::Multi {
            tracing::debug!(target: targets::SELECTION, "invert refused outside multi mode");
            return false;
        }
        let visible = self.visible_query();
        let added = self.added_items();
        self.commit_with(true, |current| {
            current
                .inverted_against(&visible.params, &added)
                .with_hidden_ids(visible.hidden)
        })
    }

    /// Replace the selection.
    pub fn set_selection(&self, selection: Selection<S>) -> bool {
        if self.mode.get() == SelectMode::NoSelection {
            return false;
        }
        self.commit_with(true, |_| selection)
    }

    /// Select nothing.
    pub fn clear(&self) -> bool {
        self.commit_with(true, |_| self.blank())
    }

    /// Drop `ids` from the selection without asking observers.
    pub(crate) fn forget_ids(&self, ids: &std::collections::HashSet<S::Id>) {
        if ids.is_empty() {
            return;
        }
        self.commit_with(false, |current| current.without_ids(ids));
    }

    /// Select nothing without asking observers.
    pub(crate) fn reset(&self) {
        let current = self.selection();
        if current.selected_ids().is_some_and(|ids| ids.is_empty()) && current.transient_items().next().is_none() {
            return;
        }
        self.commit_with(false, |_| self.blank());
    }

    fn commit_with<F>(&self, vetoable: bool, compute: F) -> bool
    where
        F: FnOnce(&Selection<S>) -> Selection<S>,
    {
        let change = {
            let _commit = self.commit.lock();
            let old = self.selection();
            let new = Arc::new(compute(&old));
            let change = SelectionChange { old, new };

            if vetoable && !self.selection_about_to_change.request(&change) {
                tracing::debug!(target: targets::SELECTION, "selection change vetoed");
                return false;
            }
            *self.current.write() = change.new.clone();
            change
        };
        tracing::trace!(target: targets::SELECTION, kind = ?change.new.kind(), "selection changed");
        self.selection_changed.emit(change);
        true
    }
}
