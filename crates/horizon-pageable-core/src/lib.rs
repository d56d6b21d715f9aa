//! Core primitives for Horizon Pageable.
//!
//! This crate provides the reactive building blocks the pageable collection
//! engine is made of:
//!
//! - **Signal/Slot System**: Type-safe change notification ([`Signal`])
//! - **Veto Signals**: Pre-commit approval requests that observers may reject ([`VetoSignal`])
//! - **Properties**: Values with change detection ([`Property`])
//! - **Memoized values**: Lazily loaded, resettable, race-free cached values ([`Memo`])
//! - **Logging**: `tracing` targets and backend spans
//!
//! # Example
//!
//! ```
//! use horizon_pageable_core::{Memo, Signal};
//! use std::sync::Arc;
//!
//! let count = Arc::new(Memo::<u64>::new());
//! let filter_changed = Signal::<()>::new();
//!
//! // Drop the cached count whenever the filter changes
//! let weak = Arc::downgrade(&count);
//! filter_changed.connect(move |_| {
//!     if let Some(count) = weak.upgrade() {
//!         count.reset();
//!     }
//! });
//!
//! let n = count.get_or_try_init(|| Ok::<_, ()>(42)).unwrap();
//! assert_eq!(*n, 42);
//!
//! filter_changed.emit(());
//! assert!(!count.is_set());
//! ```

pub mod logging;
pub mod property;
pub mod signal;

pub use logging::PerfSpan;
pub use property::{Memo, Property};
pub use signal::{ConnectionId, Signal, VetoSignal};
