//! Logging facilities for Horizon Pageable.
//!
//! Horizon Pageable uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_pageable=debug")
//!     .init();
//! ```
//!
//! Every backend round trip runs inside a [`PerfSpan`], so a subscriber that
//! records span timings shows exactly which reads hit the backing service.

use std::time::Instant;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_pageable_core::signal";
    /// Backend round trip spans.
    pub const PERF: &str = "horizon_pageable::perf";
    /// Window and count caches.
    pub const CACHE: &str = "horizon_pageable::cache";
    /// Selection algebra and selection handler.
    pub const SELECTION: &str = "horizon_pageable::selection";
    /// Modification ledger.
    pub const MODIFICATIONS: &str = "horizon_pageable::modifications";
    /// Id- and page-based query strategies.
    pub const STRATEGY: &str = "horizon_pageable::strategy";
    /// Pageable collection facade.
    pub const COLLECTION: &str = "horizon_pageable::collection";
}

/// Span guard around one backend operation.
///
/// The span is entered until the guard drops; on drop the elapsed time is
/// logged at `debug` under [`targets::PERF`].
///
/// ```
/// use horizon_pageable_core::PerfSpan;
///
/// fn load_ids() {
///     let _span = PerfSpan::new("find_ids");
///     // backend call
/// }
/// ```
pub struct PerfSpan {
    operation: &'static str,
    started: Instant,
    _entered: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a span for the named backend operation.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::debug_span!(target: targets::PERF, "backend", operation);
        Self {
            operation,
            started: Instant::now(),
            _entered: span.entered(),
        }
    }
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        tracing::debug!(
            target: targets::PERF,
            operation = self.operation,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "backend call finished"
        );
    }
}
