//! In-memory backend for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::query::{FilterExpr, QueryParams};
use crate::service::{IdQueryService, PageQueryService, QueryService};
use crate::source::{IdSource, ItemSource, PageSource};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Row {
    pub id: u32,
    pub label: String,
}

pub(crate) fn row(id: u32) -> Row {
    Row {
        id,
        label: format!("row-{id}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RowFilter {
    IdBelow(u32),
    Excluding(Option<Box<RowFilter>>, Vec<u32>),
}

impl RowFilter {
    fn accepts(&self, row: &Row) -> bool {
        match self {
            Self::IdBelow(limit) => row.id < *limit,
            Self::Excluding(base, ids) => {
                !ids.contains(&row.id) && base.as_ref().is_none_or(|base| base.accepts(row))
            }
        }
    }
}

impl FilterExpr<u32> for RowFilter {
    fn exclude_ids(base: Option<&Self>, ids: &[u32]) -> Self {
        Self::Excluding(base.cloned().map(Box::new), ids.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Order {
    Ascending,
    Descending,
}

pub(crate) type Params = QueryParams<RowFilter, Order>;

/// Rows `0..n` in ascending id order; every backend call is counted.
#[derive(Default)]
pub(crate) struct MemoryBackend {
    rows: RwLock<Vec<Row>>,
    vanished: RwLock<HashSet<u32>>,
    pub items_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub find_ids_calls: AtomicUsize,
    pub ids_fetched: AtomicUsize,
    pub items_for_ids_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn with_rows(n: u32) -> Arc<Self> {
        let backend = Self::default();
        *backend.rows.write() = (0..n).map(row).collect();
        Arc::new(backend)
    }

    /// Deletes rows behind the engine's back.
    pub fn delete_externally(&self, ids: &[u32]) {
        self.rows.write().retain(|row| !ids.contains(&row.id));
    }

    /// Ids keep matching queries but their items can no longer be read, as
    /// if deleted between an id query and the item fetch.
    pub fn vanish(&self, ids: &[u32]) {
        self.vanished.write().extend(ids.iter().copied());
    }

    fn readable(&self, id: u32) -> bool {
        !self.vanished.read().contains(&id)
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn matching(&self, query: &Params) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows
            .read()
            .iter()
            .filter(|row| query.filter().is_none_or(|filter| filter.accepts(row)))
            .cloned()
            .collect();
        if query.sort() == Some(&Order::Descending) {
            rows.reverse();
        }
        rows
    }
}

fn window<T>(all: Vec<T>, start: u64, limit: Option<usize>) -> Vec<T> {
    let rest = all.into_iter().skip(start as usize);
    match limit {
        Some(limit) => rest.take(limit).collect(),
        None => rest.collect(),
    }
}

impl QueryService for MemoryBackend {
    type Item = Row;
    type Id = u32;
    type Filter = RowFilter;
    type Sort = Order;

    fn id_for_item(&self, item: &Row) -> u32 {
        item.id
    }

    fn item_for_id(&self, id: &u32) -> Result<Option<Row>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if !self.readable(*id) {
            return Ok(None);
        }
        Ok(self.rows.read().iter().find(|row| row.id == *id).cloned())
    }

    fn item_count(&self, query: &Params) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matching(query).len() as u64)
    }

    fn items_for_ids(&self, ids: &[u32]) -> Result<Vec<Row>> {
        self.items_for_ids_calls.fetch_add(1, Ordering::SeqCst);
        // Reverse to make sure callers re-sort.
        let mut rows: Vec<Row> = self
            .rows
            .read()
            .iter()
            .filter(|row| ids.contains(&row.id) && self.readable(row.id))
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

impl PageQueryService for MemoryBackend {
    fn items(&self, query: &Params, start: u64, page_size: usize) -> Result<Vec<Row>> {
        self.items_calls.fetch_add(1, Ordering::SeqCst);
        Ok(window(self.matching(query), start, Some(page_size)))
    }
}

impl IdQueryService for MemoryBackend {
    fn find_ids(&self, query: &Params, start: u64, limit: Option<usize>) -> Result<Vec<u32>> {
        self.find_ids_calls.fetch_add(1, Ordering::SeqCst);
        let ids = window(
            self.matching(query).into_iter().map(|row| row.id).collect(),
            start,
            limit,
        );
        self.ids_fetched.fetch_add(ids.len(), Ordering::SeqCst);
        Ok(ids)
    }
}

pub(crate) fn id_source(backend: &Arc<MemoryBackend>) -> Arc<dyn ItemSource<MemoryBackend>> {
    Arc::new(IdSource::new(backend.clone()))
}

pub(crate) fn page_source(backend: &Arc<MemoryBackend>) -> Arc<dyn ItemSource<MemoryBackend>> {
    Arc::new(PageSource::new(backend.clone()))
}
