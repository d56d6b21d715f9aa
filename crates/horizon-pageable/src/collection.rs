//! The pageable collection facade.
//!
//! [`PageableCollection`] is what a table or list binds to. It combines:
//!
//! - a shared [`QueryDescriptor`] (filter, sort, result limit),
//! - a [`QueryStrategy`] over the backend (id based or page based),
//! - a [`SelectionHandler`] and a [`ModificationHandler`],
//! - the pager: page size, 0-based page index and the memoized current page.
//!
//! Query-backed rows come first, followed by locally added items. Locally
//! removed items are hidden by filtering them out of the query.
//!
//! # Example
//!
//! ```ignore
//! use horizon_pageable::{PageableCollection, PageableConfig, QueryParams};
//!
//! let collection = PageableCollection::with_id_service(
//!     service,
//!     QueryParams::new(),
//!     PageableConfig::new().with_page_size(25),
//! )?;
//!
//! collection.page_changed().connect(|_| println!("page needs repaint"));
//! let rows = collection.items_on_page()?;
//! collection.next_page()?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::{Memo, Property, Signal};

use crate::config::PageableConfig;
use crate::error::{PageableError, Result};
use crate::modifications::ModificationHandler;
use crate::paging::{page_count, PageSpan};
use crate::query::{QueryChange, QueryDescriptor, QueryWatch};
use crate::selection_handler::{SelectionHandler, VisibleQuery};
use crate::service::{IdQueryService, PageQueryService, ParamsOf, QueryOf, QueryService};
use crate::strategy::{IdStrategy, PageStrategy, QueryStrategy, StrategyKind};

struct LoadedPage<T> {
    index: usize,
    size: usize,
    items: Vec<T>,
}

struct Pager<S: QueryService> {
    page_size: Property<usize>,
    page_index: Property<usize>,
    page: Memo<LoadedPage<S::Item>>,
    page_changed: Signal<()>,
}

impl<S: QueryService> Pager<S> {
    fn invalidate(&self) -> bool {
        let dropped = self.page.reset();
        if dropped {
            self.page_changed.emit(());
        }
        dropped
    }
}

/// A query-backed, pageable, selectable and locally modifiable collection.
pub struct PageableCollection<S: QueryService> {
    query: Arc<QueryOf<S>>,
    strategy: Arc<dyn QueryStrategy<S>>,
    config: PageableConfig,
    pager: Arc<Pager<S>>,
    selection: Arc<SelectionHandler<S>>,
    modifications: Arc<ModificationHandler<S>>,
    _watch: QueryWatch<S::Filter, S::Sort>,
}

impl<S: PageQueryService> PageableCollection<S> {
    /// Browse a page-based backend.
    pub fn with_page_service(service: Arc<S>, params: ParamsOf<S>, config: PageableConfig) -> Result<Self> {
        let query = Arc::new(QueryDescriptor::new(params));
        let strategy = Arc::new(PageStrategy::new(service, &query));
        Self::new(query, strategy, config)
    }
}

impl<S: IdQueryService> PageableCollection<S> {
    /// Browse an id-based backend.
    pub fn with_id_service(service: Arc<S>, params: ParamsOf<S>, config: PageableConfig) -> Result<Self> {
        let query = Arc::new(QueryDescriptor::new(params));
        let strategy = Arc::new(IdStrategy::new(service, config.size_guard));
        Self::new(query, strategy, config)
    }
}

impl<S: QueryService> PageableCollection<S> {
    /// Assemble a collection from a descriptor and a strategy.
    ///
    /// Fails if `config` is out of range.
    pub fn new(
        query: Arc<QueryOf<S>>,
        strategy: Arc<dyn QueryStrategy<S>>,
        config: PageableConfig,
    ) -> Result<Self> {
        config.validate()?;

        let pager = Arc::new(Pager {
            page_size: Property::new(config.page_size),
            page_index: Property::new(0),
            page: Memo::new(),
            page_changed: Signal::new(),
        });
        let source = strategy.source();
        let selection = Arc::new(SelectionHandler::new(query.clone(), source.clone(), &config));
        let modifications = Arc::new(ModificationHandler::new(source, config.max_removed_ids));

        let weak_modifications = Arc::downgrade(&modifications);
        selection.set_added_items_provider(move || {
            weak_modifications
                .upgrade()
                .map(|modifications| modifications.added_items())
                .unwrap_or_default()
        });
        let visible_query = query.clone();
        let visible_modifications = Arc::downgrade(&modifications);
        selection.set_visible_query_provider(move || match visible_modifications.upgrade() {
            Some(modifications) => VisibleQuery {
                params: effective_query(&visible_query, &modifications),
                hidden: modifications.removed_ids(),
            },
            None => VisibleQuery {
                params: visible_query.params(),
                hidden: Vec::new(),
            },
        });

        let weak_pager = Arc::downgrade(&pager);
        modifications.changed.connect(move |_| {
            if let Some(pager) = weak_pager.upgrade() {
                pager.invalidate();
            }
        });

        let removal_strategy = strategy.clone();
        let removal_query = Arc::downgrade(&query);
        let removal_modifications = Arc::downgrade(&modifications);
        let removal_selection = Arc::downgrade(&selection);
        modifications.items_removed.connect(move |removed| {
            if let (Some(query), Some(modifications)) =
                (removal_query.upgrade(), removal_modifications.upgrade())
            {
                let after = effective_query(&query, &modifications);
                removal_strategy.items_removed(&removed.persistent, &after);
            }
            if let Some(selection) = removal_selection.upgrade() {
                selection.forget_ids(&removed.all());
            }
        });

        let watch = query.watch(query_watcher(
            strategy.clone(),
            Arc::downgrade(&pager),
            Arc::downgrade(&selection),
            config.clear_selection_on_filter_change,
        ));

        tracing::debug!(
            target: targets::COLLECTION,
            kind = ?strategy.kind(),
            page_size = config.page_size,
            "collection created"
        );

        Ok(Self {
            query,
            strategy,
            config,
            pager,
            selection,
            modifications,
            _watch: watch,
        })
    }

    /// The configuration the collection was created with.
    pub fn config(&self) -> &PageableConfig {
        &self.config
    }

    /// The backend contract in use.
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// The query descriptor. Changing it resets the pager.
    pub fn query(&self) -> &Arc<QueryOf<S>> {
        &self.query
    }

    /// Replace filter, sort and limit at once.
    pub fn set_query(&self, params: ParamsOf<S>) -> Vec<QueryChange> {
        self.query.set_params(params)
    }

    /// The descriptor's parameters with locally removed ids filtered out.
    pub fn effective_query(&self) -> ParamsOf<S> {
        effective_query(&self.query, &self.modifications)
    }

    /// The selection handler.
    pub fn selection_handler(&self) -> &Arc<SelectionHandler<S>> {
        &self.selection
    }

    /// The modification handler.
    pub fn modification_handler(&self) -> &Arc<ModificationHandler<S>> {
        &self.modifications
    }

    /// Emitted whenever the current page may show different rows.
    pub fn page_changed(&self) -> &Signal<()> {
        &self.pager.page_changed
    }

    /// Remove the currently selected items.
    ///
    /// Returns `Ok(false)` if the removal was vetoed.
    pub fn remove_selected(&self) -> Result<bool> {
        self.modifications.remove_selected(&self.selection.selection())
    }

    /// Number of query-backed rows.
    pub fn query_item_count(&self) -> Result<u64> {
        self.strategy.item_count(&self.effective_query())
    }

    /// Number of rows: query-backed plus locally added.
    pub fn item_count(&self) -> Result<u64> {
        Ok(self.query_item_count()? + self.modifications.added_count() as u64)
    }

    /// Number of pages; never less than one.
    pub fn page_count(&self) -> Result<usize> {
        Ok(page_count(self.item_count()?, self.page_size()))
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.pager.page_size.get()
    }

    /// Change the page size, keeping the first row of the current page visible.
    pub fn set_page_size(&self, page_size: usize) -> Result<bool> {
        if page_size == 0 {
            return Err(PageableError::invalid_config("page_size must be positive"));
        }
        let first_row = self.page_index() * self.page_size();
        if !self.pager.page_size.set(page_size) {
            return Ok(false);
        }
        self.pager.page_index.set(first_row / page_size);
        self.pager.page_changed.emit(());
        Ok(true)
    }

    /// The 0-based index of the current page.
    pub fn page_index(&self) -> usize {
        self.pager.page_index.get()
    }

    /// Go to page `index`, clamped to the last page.
    pub fn set_page_index(&self, index: usize) -> Result<bool> {
        let last = self.page_count()? - 1;
        let index = index.min(last);
        if !self.pager.page_index.set(index) {
            return Ok(false);
        }
        tracing::trace!(target: targets::COLLECTION, index, "page index changed");
        self.pager.page_changed.emit(());
        Ok(true)
    }

    /// Returns `true` if a page follows the current one.
    pub fn has_next_page(&self) -> Result<bool> {
        Ok(self.page_index() + 1 < self.page_count()?)
    }

    /// Returns `true` if the current page is not the first.
    pub fn has_previous_page(&self) -> bool {
        self.page_index() > 0
    }

    /// Go to the next page, if any.
    pub fn next_page(&self) -> Result<bool> {
        if !self.has_next_page()? {
            return Ok(false);
        }
        self.set_page_index(self.page_index() + 1)
    }

    /// Go to the previous page, if any.
    pub fn previous_page(&self) -> Result<bool> {
        match self.page_index().checked_sub(1) {
            Some(index) => self.set_page_index(index),
            None => Ok(false),
        }
    }

    /// Go to the first page.
    pub fn first_page(&self) -> Result<bool> {
        self.set_page_index(0)
    }

    /// Go to the last page.
    pub fn last_page(&self) -> Result<bool> {
        self.set_page_index(usize::MAX)
    }

    /// The rows of the current page.
    ///
    /// The page is loaded once and kept until the query, the ledger, the page
    /// or [`clear_caches`](Self::clear_caches) says otherwise.
    pub fn items_on_page(&self) -> Result<Vec<S::Item>> {
        let index = self.page_index();
        let size = self.page_size();
        let page = self.pager.page.get_or_try_init_if(
            |page| page.index == index && page.size == size,
            || self.load_page(index, size),
        )?;
        Ok(page.items.clone())
    }

    fn load_page(&self, index: usize, size: usize) -> Result<LoadedPage<S::Item>> {
        let query = self.effective_query();
        let query_count = self.strategy.item_count(&query)?;
        let added = self.modifications.added_items();
        let span = PageSpan::compute(index, size, query_count, added.len());

        let mut items = if span.query_len() > 0 {
            self.strategy.window(&query, span.query_rows.start, span.query_len())?
        } else {
            Vec::new()
        };
        items.extend_from_slice(&added[span.added_rows.clone()]);

        tracing::debug!(
            target: targets::COLLECTION,
            index,
            size,
            kind = ?span.kind(),
            rows = items.len(),
            "page loaded"
        );
        Ok(LoadedPage { index, size, items })
    }

    /// The row at absolute position `index`, `None` past the end.
    ///
    /// Fails with `NoItemForId` if the row's item vanished.
    pub fn item_at(&self, index: u64) -> Result<Option<S::Item>> {
        let query = self.effective_query();
        let query_count = self.strategy.item_count(&query)?;
        if index < query_count {
            return self.strategy.item_at(&query, index);
        }
        let offset = usize::try_from(index - query_count).unwrap_or(usize::MAX);
        Ok(self.modifications.added_items().get(offset).cloned())
    }

    /// The item for `id`, including locally added items.
    pub fn item_for_id(&self, id: &S::Id) -> Result<Option<S::Item>> {
        let source = self.strategy.source();
        let added = self
            .modifications
            .added_items()
            .into_iter()
            .find(|item| source.service().id_for_item(item) == *id);
        match added {
            Some(item) => Ok(Some(item)),
            None => self.strategy.item_for_id(id),
        }
    }

    /// Iterate every row: query-backed rows window by window, then added items.
    ///
    /// The query and its count are fixed when the iterator is created.
    pub fn iter(&self) -> Result<CollectionIter<'_, S>> {
        let query = self.effective_query();
        let query_count = self.strategy.item_count(&query)?;
        Ok(CollectionIter {
            strategy: self.strategy.as_ref(),
            query,
            query_count,
            position: 0,
            block_size: self.config.id_block_size,
            buffer: VecDeque::new(),
            added: self.modifications.added_items().into(),
            failed: false,
        })
    }

    /// Drop every cached count, id list, window and page.
    ///
    /// Call after the backend changed, e.g. once local modifications were
    /// saved. Calling it again without reads in between does nothing.
    pub fn clear_caches(&self) {
        let strategy = self.strategy.clear_caches();
        let page = self.pager.invalidate();
        if strategy || page {
            tracing::debug!(target: targets::COLLECTION, "caches cleared");
        }
    }
}

fn effective_query<S: QueryService>(query: &QueryOf<S>, modifications: &ModificationHandler<S>) -> ParamsOf<S> {
    let params = query.params();
    let filter = modifications.removed_items_filter(params.filter());
    params.replace_filter(filter)
}

fn query_watcher<S: QueryService>(
    strategy: Arc<dyn QueryStrategy<S>>,
    pager: Weak<Pager<S>>,
    selection: Weak<SelectionHandler<S>>,
    clear_selection_on_filter_change: bool,
) -> impl Fn(&QueryChange) + Send + Sync + 'static {
    move |change| {
        strategy.query_changed(*change);
        if *change == QueryChange::Filter && clear_selection_on_filter_change {
            if let Some(selection) = selection.upgrade() {
                selection.reset();
            }
        }
        if let Some(pager) = pager.upgrade() {
            pager.page.reset();
            pager.page_index.set(0);
            pager.page_changed.emit(());
        }
    }
}

/// Iterator over every row of a [`PageableCollection`].
///
/// Yields `Err` at most once, then ends.
pub struct CollectionIter<'a, S: QueryService> {
    strategy: &'a dyn QueryStrategy<S>,
    query: ParamsOf<S>,
    query_count: u64,
    position: u64,
    block_size: usize,
    buffer: VecDeque<S::Item>,
    added: VecDeque<S::Item>,
    failed: bool,
}

impl<S: QueryService> Iterator for CollectionIter<'_, S> {
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.buffer.is_empty() && self.position < self.query_count {
            match self.strategy.window(&self.query, self.position, self.block_size) {
                Ok(window) => {
                    self.position += self.block_size as u64;
                    self.buffer.extend(window);
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        self.buffer
            .pop_front()
            .or_else(|| self.added.pop_front())
            .map(Ok)
    }
}
