//! Result size guard.
//!
//! A query with `max_results` must not load more than that many ids. Two
//! strategies detect a violation, with opposite costs:
//!
//! - [`SizeGuardStrategy::SingleQuery`] asks for `max_results + 1` ids in one
//!   round trip. Cheap when the backend's sort is cheap, wasteful when it has
//!   to sort a huge result only for the caller to reject it.
//! - [`SizeGuardStrategy::ExtraCount`] counts first and only fetches when the
//!   count fits. Two round trips, but an oversized result is never sorted.
//!
//! The right choice depends on the backend, so it is configuration.

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::PerfSpan;
use serde::{Deserialize, Serialize};

use crate::error::{PageableError, Result};
use crate::service::{IdQueryService, ParamsOf};

/// How `max_results` violations are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeGuardStrategy {
    /// Fetch `max_results + 1` ids; more than `max_results` is a violation.
    #[default]
    SingleQuery,
    /// Count first; fetch only when the count is within the limit.
    ExtraCount,
}

impl SizeGuardStrategy {
    /// Load every id matching `query`, enforcing its `max_results`.
    pub fn load_ids<S: IdQueryService>(&self, service: &S, query: &ParamsOf<S>) -> Result<Vec<S::Id>> {
        let Some(limit) = query.max_results() else {
            let _span = PerfSpan::new("find_ids");
            return service.find_ids(query, 0, None);
        };

        match self {
            Self::SingleQuery => {
                let probe = usize::try_from(limit.saturating_add(1)).unwrap_or(usize::MAX);
                let ids = {
                    let _span = PerfSpan::new("find_ids");
                    service.find_ids(query, 0, Some(probe))?
                };
                if ids.len() as u64 > limit {
                    tracing::debug!(target: targets::STRATEGY, limit, "single query guard tripped");
                    return Err(PageableError::max_results_exceeded(limit, None));
                }
                Ok(ids)
            }
            Self::ExtraCount => {
                let count = {
                    let _span = PerfSpan::new("item_count");
                    service.item_count(query)?
                };
                check_count(Some(limit), count)?;
                let fetch = usize::try_from(limit).unwrap_or(usize::MAX);
                let _span = PerfSpan::new("find_ids");
                service.find_ids(query, 0, Some(fetch))
            }
        }
    }
}

/// Fails with `MaxResultsExceeded` if `count` exceeds `limit`.
pub fn check_count(limit: Option<u64>, count: u64) -> Result<()> {
    match limit {
        Some(limit) if count > limit => {
            tracing::debug!(target: targets::STRATEGY, limit, count, "count guard tripped");
            Err(PageableError::max_results_exceeded(limit, Some(count)))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryBackend, Params, RowFilter};

    #[test]
    fn test_check_count() {
        assert!(check_count(None, u64::MAX).is_ok());
        assert!(check_count(Some(5), 5).is_ok());
        assert!(matches!(
            check_count(Some(5), 6),
            Err(PageableError::MaxResultsExceeded {
                limit: 5,
                found: Some(6)
            })
        ));
    }

    fn six_matching() -> (std::sync::Arc<MemoryBackend>, Params) {
        let backend = MemoryBackend::with_rows(100);
        let query = Params::new()
            .with_filter(RowFilter::IdBelow(6))
            .with_max_results(5);
        (backend, query)
    }

    #[test]
    fn test_single_query_fetches_at_most_limit_plus_one() {
        let (backend, query) = six_matching();
        let err = SizeGuardStrategy::SingleQuery
            .load_ids(backend.as_ref(), &query)
            .unwrap_err();

        assert!(matches!(
            err,
            PageableError::MaxResultsExceeded {
                limit: 5,
                found: None
            }
        ));
        assert!(!err.is_retryable());
        assert!(MemoryBackend::calls(&backend.ids_fetched) <= 6);
        assert_eq!(MemoryBackend::calls(&backend.count_calls), 0);
    }

    #[test]
    fn test_extra_count_never_fetches_oversized() {
        let (backend, query) = six_matching();
        let err = SizeGuardStrategy::ExtraCount
            .load_ids(backend.as_ref(), &query)
            .unwrap_err();

        assert!(matches!(
            err,
            PageableError::MaxResultsExceeded {
                limit: 5,
                found: Some(6)
            }
        ));
        assert_eq!(MemoryBackend::calls(&backend.count_calls), 1);
        assert_eq!(MemoryBackend::calls(&backend.find_ids_calls), 0);
    }

    #[test]
    fn test_within_limit_loads_all() {
        let backend = MemoryBackend::with_rows(100);
        let query = Params::new()
            .with_filter(RowFilter::IdBelow(5))
            .with_max_results(5);
        for guard in [SizeGuardStrategy::SingleQuery, SizeGuardStrategy::ExtraCount] {
            assert_eq!(guard.load_ids(backend.as_ref(), &query).unwrap(), vec![0, 1, 2, 3, 4]);
        }
        let unlimited = Params::new();
        assert_eq!(
            SizeGuardStrategy::ExtraCount
                .load_ids(backend.as_ref(), &unlimited)
                .unwrap()
                .len(),
            100
        );
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            guard: SizeGuardStrategy,
        }
        let parsed: Wrapper = toml::from_str(r#"guard = "extra_count""#).unwrap();
        assert_eq!(parsed.guard, SizeGuardStrategy::ExtraCount);
    }
}
