//! Result limit enforcement for id-based collections.

mod common;

use common::{init_tracing, Calls, CustomerFilter, IdBackend, Query};
use horizon_pageable::{PageableCollection, PageableConfig, PageableError, SizeGuardStrategy};

fn limited(guard: SizeGuardStrategy) -> (std::sync::Arc<IdBackend>, PageableCollection<IdBackend>) {
    init_tracing();
    let backend = IdBackend::with_customers(100);
    let query = Query::new()
        .with_filter(CustomerFilter::IdBelow(6))
        .with_max_results(5);
    let config = PageableConfig::new().with_size_guard(guard);
    let collection = PageableCollection::with_id_service(backend.clone(), query, config).unwrap();
    (backend, collection)
}

#[test]
fn test_single_query_guard() {
    let (backend, collection) = limited(SizeGuardStrategy::SingleQuery);

    let err = collection.items_on_page().unwrap_err();
    assert!(matches!(
        err,
        PageableError::MaxResultsExceeded { limit: 5, found: None }
    ));
    assert!(Calls::get(&backend.store.calls.ids_fetched) <= 6);
    assert_eq!(Calls::get(&backend.store.calls.count), 0);
}

#[test]
fn test_extra_count_guard() {
    let (backend, collection) = limited(SizeGuardStrategy::ExtraCount);

    let err = collection.item_count().unwrap_err();
    assert!(matches!(
        err,
        PageableError::MaxResultsExceeded {
            limit: 5,
            found: Some(6)
        }
    ));
    assert_eq!(Calls::get(&backend.store.calls.count), 1);
    assert_eq!(Calls::get(&backend.store.calls.find_ids), 0);
}

#[test]
fn test_narrowed_query_loads() {
    for guard in [SizeGuardStrategy::SingleQuery, SizeGuardStrategy::ExtraCount] {
        let (_backend, collection) = limited(guard);
        collection.query().set_filter(Some(CustomerFilter::IdBelow(5)));
        assert_eq!(collection.item_count().unwrap(), 5);
        assert_eq!(collection.items_on_page().unwrap().len(), 5);
    }
}

#[test]
fn test_failed_load_is_retried() {
    let (backend, collection) = limited(SizeGuardStrategy::SingleQuery);
    assert!(collection.items_on_page().is_err());
    assert!(collection.items_on_page().is_err());
    assert_eq!(Calls::get(&backend.store.calls.find_ids), 2);
}
