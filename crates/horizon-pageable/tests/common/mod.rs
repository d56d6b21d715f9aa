//! Shared in-memory backends for integration tests.
//!
//! [`Store`] holds customers `0..n` named `customer-<id>`. [`PageBackend`] and
//! [`IdBackend`] expose it through the two backend contracts and count every
//! call, so tests can assert how often the engine went to the backend.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use horizon_pageable::{
    FilterExpr, IdQueryService, PageQueryService, PageableError, QueryParams, QueryService, Result,
};
use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: u64,
    pub name: String,
}

pub fn customer(id: u64) -> Customer {
    Customer {
        id,
        name: format!("customer-{id}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CustomerFilter {
    IdBelow(u64),
    Not(Option<Box<CustomerFilter>>, Vec<u64>),
}

impl CustomerFilter {
    fn accepts(&self, customer: &Customer) -> bool {
        match self {
            Self::IdBelow(limit) => customer.id < *limit,
            Self::Not(base, ids) => {
                !ids.contains(&customer.id) && base.as_ref().is_none_or(|base| base.accepts(customer))
            }
        }
    }
}

impl FilterExpr<u64> for CustomerFilter {
    fn exclude_ids(base: Option<&Self>, ids: &[u64]) -> Self {
        Self::Not(base.cloned().map(Box::new), ids.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CustomerSort {
    IdAscending,
    IdDescending,
}

pub type Query = QueryParams<CustomerFilter, CustomerSort>;

/// Call counters of one backend.
#[derive(Debug, Default)]
pub struct Calls {
    pub items: AtomicUsize,
    pub count: AtomicUsize,
    pub find_ids: AtomicUsize,
    pub ids_fetched: AtomicUsize,
    pub items_for_ids: AtomicUsize,
    pub item_for_id: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// The shared customer table.
#[derive(Default)]
pub struct Store {
    customers: RwLock<Vec<Customer>>,
    unreadable: RwLock<HashSet<u64>>,
    offline: AtomicBool,
    pub calls: Calls,
}

impl Store {
    pub fn with_customers(n: u64) -> Self {
        let store = Self::default();
        *store.customers.write() = (0..n).map(customer).collect();
        store
    }

    /// Items of `ids` can no longer be read, but the ids still match queries.
    pub fn make_unreadable(&self, ids: &[u64]) {
        self.unreadable.write().extend(ids.iter().copied());
    }

    /// Every following call fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PageableError::backend(io::Error::new(
                io::ErrorKind::NotConnected,
                "customer database offline",
            )));
        }
        Ok(())
    }

    fn matching(&self, query: &Query) -> Vec<Customer> {
        let mut customers: Vec<Customer> = self
            .customers
            .read()
            .iter()
            .filter(|customer| query.filter().is_none_or(|filter| filter.accepts(customer)))
            .cloned()
            .collect();
        if query.sort() == Some(&CustomerSort::IdDescending) {
            customers.reverse();
        }
        customers
    }

    fn lookup(&self, id: u64) -> Result<Option<Customer>> {
        self.check_online()?;
        Calls::bump(&self.calls.item_for_id);
        if self.unreadable.read().contains(&id) {
            return Ok(None);
        }
        Ok(self.customers.read().iter().find(|customer| customer.id == id).cloned())
    }

    fn count(&self, query: &Query) -> Result<u64> {
        self.check_online()?;
        Calls::bump(&self.calls.count);
        Ok(self.matching(query).len() as u64)
    }
}

fn window<T>(all: Vec<T>, start: u64, limit: Option<usize>) -> Vec<T> {
    let rest = all.into_iter().skip(start as usize);
    match limit {
        Some(limit) => rest.take(limit).collect(),
        None => rest.collect(),
    }
}

/// Page-based access to a [`Store`].
pub struct PageBackend {
    pub store: Store,
}

impl PageBackend {
    pub fn with_customers(n: u64) -> Arc<Self> {
        Arc::new(Self {
            store: Store::with_customers(n),
        })
    }
}

impl QueryService for PageBackend {
    type Item = Customer;
    type Id = u64;
    type Filter = CustomerFilter;
    type Sort = CustomerSort;

    fn id_for_item(&self, item: &Customer) -> u64 {
        item.id
    }

    fn item_for_id(&self, id: &u64) -> Result<Option<Customer>> {
        self.store.lookup(*id)
    }

    fn item_count(&self, query: &Query) -> Result<u64> {
        self.store.count(query)
    }
}

impl PageQueryService for PageBackend {
    fn items(&self, query: &Query, start: u64, page_size: usize) -> Result<Vec<Customer>> {
        self.store.check_online()?;
        Calls::bump(&self.store.calls.items);
        Ok(window(self.store.matching(query), start, Some(page_size)))
    }
}

/// Id-based access to a [`Store`].
pub struct IdBackend {
    pub store: Store,
}

impl IdBackend {
    pub fn with_customers(n: u64) -> Arc<Self> {
        Arc::new(Self {
            store: Store::with_customers(n),
        })
    }
}

impl QueryService for IdBackend {
    type Item = Customer;
    type Id = u64;
    type Filter = CustomerFilter;
    type Sort = CustomerSort;

    fn id_for_item(&self, item: &Customer) -> u64 {
        item.id
    }

    fn item_for_id(&self, id: &u64) -> Result<Option<Customer>> {
        self.store.lookup(*id)
    }

    fn item_count(&self, query: &Query) -> Result<u64> {
        self.store.count(query)
    }

    fn items_for_ids(&self, ids: &[u64]) -> Result<Vec<Customer>> {
        self.store.check_online()?;
        Calls::bump(&self.store.calls.items_for_ids);
        let unreadable = self.store.unreadable.read();
        // Unordered on purpose, like a real `WHERE id IN (...)`.
        let mut customers: Vec<Customer> = self
            .store
            .customers
            .read()
            .iter()
            .filter(|customer| ids.contains(&customer.id) && !unreadable.contains(&customer.id))
            .cloned()
            .collect();
        customers.reverse();
        Ok(customers)
    }
}

impl IdQueryService for IdBackend {
    fn find_ids(&self, query: &Query, start: u64, limit: Option<usize>) -> Result<Vec<u64>> {
        self.store.check_online()?;
        Calls::bump(&self.store.calls.find_ids);
        let ids = window(
            self.store.matching(query).into_iter().map(|customer| customer.id).collect(),
            start,
            limit,
        );
        self.store.calls.ids_fetched.fetch_add(ids.len(), Ordering::SeqCst);
        Ok(ids)
    }
}

/// Route engine logs to the test output; `RUST_LOG=horizon_pageable=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ids(customers: &[Customer]) -> Vec<u64> {
    customers.iter().map(|customer| customer.id).collect()
}
