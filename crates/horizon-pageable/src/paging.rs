//! Page arithmetic.
//!
//! A collection shows its query-backed rows first, followed by the items added
//! locally in insertion order. [`PageSpan::compute`] splits a page into the
//! part served by the query and the part served by added items. The split must
//! be exact at page boundaries: a row may neither repeat on two pages nor
//! disappear between them as added items accumulate.
//!
//! Page indices are 0-based.

use std::ops::Range;

/// Where the rows of a page come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// The page is past the last row.
    Empty,
    /// Every row comes from the query.
    QueryOnly,
    /// Leading rows come from the query, trailing rows from added items.
    Mixed,
    /// Every row is a locally added item.
    AddedOnly,
}

/// The rows of one page, split by origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpan {
    /// Absolute positions in the query result.
    pub query_rows: Range<u64>,
    /// Positions in the added-items list.
    pub added_rows: Range<usize>,
}

impl PageSpan {
    /// Split page `page_index` of size `page_size`.
    pub fn compute(page_index: usize, page_size: usize, query_count: u64, added_count: usize) -> Self {
        let size = page_size as u64;
        let start = (page_index as u64).saturating_mul(size);
        let end = start.saturating_add(size);

        let query_rows = start.min(query_count)..end.min(query_count);

        let added_count = added_count as u64;
        let added_start = start.saturating_sub(query_count).min(added_count);
        let added_end = end.saturating_sub(query_count).min(added_count);

        Self {
            query_rows,
            added_rows: added_start as usize..added_end as usize,
        }
    }

    /// Number of query-backed rows on the page.
    pub fn query_len(&self) -> usize {
        (self.query_rows.end - self.query_rows.start) as usize
    }

    /// Number of rows on the page.
    pub fn len(&self) -> usize {
        self.query_len() + self.added_rows.len()
    }

    /// Returns `true` if the page has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify the page.
    pub fn kind(&self) -> PageKind {
        match (self.query_len() > 0, !self.added_rows.is_empty()) {
            (false, false) => PageKind::Empty,
            (true, false) => PageKind::QueryOnly,
            (true, true) => PageKind::Mixed,
            (false, true) => PageKind::AddedOnly,
        }
    }
}

/// Number of pages needed for `total` rows. An empty collection has one
/// (empty) page so that page 0 is always valid.
pub fn page_count(total: u64, page_size: usize) -> usize {
    if page_size == 0 || total == 0 {
        return 1;
    }
    total.div_ceil(page_size as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_page_at_query_boundary() {
        // 25 query rows, 3 added rows, 10 per page.
        let span = PageSpan::compute(2, 10, 25, 3);
        assert_eq!(span.query_rows, 20..25);
        assert_eq!(span.added_rows, 0..3);
        assert_eq!(span.kind(), PageKind::Mixed);
        assert_eq!(span.len(), 8);

        let next = PageSpan::compute(3, 10, 25, 3);
        assert_eq!(next.kind(), PageKind::Empty);
        assert!(next.is_empty());
    }

    #[test]
    fn test_added_only_page_offset() {
        // 20 query rows, 15 added rows: page 5 starts 5 rows into the added list.
        let span = PageSpan::compute(4, 5, 20, 15);
        assert_eq!(span.kind(), PageKind::AddedOnly);
        assert_eq!(span.added_rows, 0..5);

        let span = PageSpan::compute(5, 5, 20, 15);
        assert_eq!(span.added_rows, 5..10);
    }

    #[test]
    fn test_pages_cover_every_row_once() {
        for query_count in [0u64, 1, 9, 10, 11, 25] {
            for added in [0usize, 1, 3, 10, 17] {
                let total = query_count as usize + added;
                let pages = page_count(total as u64, 10);
                let mut query_seen = Vec::new();
                let mut added_seen = Vec::new();
                for page in 0..=pages {
                    let span = PageSpan::compute(page, 10, query_count, added);
                    query_seen.extend(span.query_rows.clone());
                    added_seen.extend(span.added_rows.clone());
                }
                assert_eq!(query_seen, (0..query_count).collect::<Vec<_>>());
                assert_eq!(added_seen, (0..added).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(28, 10), 3);
    }
}
