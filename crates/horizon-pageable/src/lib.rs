//! Horizon Pageable - query-backed collections for item views.
//!
//! This crate lets a table or list browse, sort, filter, select and locally
//! modify a dataset that lives behind a query service and may be far too
//! large to hold in memory.
//!
//! - **Query descriptors**: observable filter, sort and result limit ([`QueryDescriptor`])
//! - **Backends**: page-based ([`PageQueryService`]) or id-based ([`IdQueryService`])
//! - **Selections**: explicit or inverted, never enumerated ([`Selection`], [`SelectionHandler`])
//! - **Modifications**: added, updated and removed items ([`ModificationHandler`])
//! - **Caching**: single-slot window and count caches ([`CachingQueryService`])
//! - **Facade**: paging over all of the above ([`PageableCollection`])
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_pageable::{PageableCollection, PageableConfig, QueryParams};
//!
//! let collection = PageableCollection::with_page_service(
//!     Arc::new(CustomerService::connect()?),
//!     QueryParams::new().with_sort(CustomerSort::Name),
//!     PageableConfig::from_toml_str(&settings)?,
//! )?;
//!
//! for customer in collection.items_on_page()? {
//!     println!("{}", customer.name);
//! }
//!
//! // "Select all" over two million rows holds no ids at all.
//! collection.selection_handler().select_all(true);
//! ```

pub mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod guard;
pub mod modifications;
pub mod paging;
pub mod query;
pub mod selection;
pub mod selection_handler;
pub mod service;
pub mod source;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachingQueryService, CountCache, WindowCache};
pub use collection::{CollectionIter, PageableCollection};
pub use config::PageableConfig;
pub use error::{PageableError, Result};
pub use guard::SizeGuardStrategy;
pub use modifications::{ModificationHandler, Modifications, RemovedItems};
pub use paging::{PageKind, PageSpan};
pub use query::{FilterExpr, QueryChange, QueryDescriptor, QueryParams, QueryWatch};
pub use selection::{GapPolicy, Selection, SelectionIter, SelectionKind};
pub use selection_handler::{SelectMode, SelectionChange, SelectionHandler, VisibleQuery};
pub use service::{IdQueryService, PageQueryService, ParamsOf, QueryOf, QueryService};
pub use source::{IdSource, ItemSource, PageSource, SourceWindow};
pub use strategy::{IdStrategy, PageStrategy, QueryStrategy, StrategyKind};

pub use horizon_pageable_core::{ConnectionId, Signal, VetoSignal};
