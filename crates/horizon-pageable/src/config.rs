//! Configuration for pageable collections.
//!
//! A [`PageableConfig`] is passed to every collection constructor. There are
//! no process-wide defaults; two collections never share configuration state.
//!
//! # Example
//!
//! ```
//! use horizon_pageable::{PageableConfig, SizeGuardStrategy};
//!
//! let config = PageableConfig::from_toml_str(
//!     r#"
//!     page_size = 25
//!     size_guard = "extra_count"
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.page_size, 25);
//! assert_eq!(config.size_guard, SizeGuardStrategy::ExtraCount);
//! assert_eq!(config.max_removed_ids, 1000);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PageableError, Result};
use crate::guard::SizeGuardStrategy;
use crate::selection::GapPolicy;
use crate::selection_handler::SelectMode;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default number of ids resolved per backend call during iteration.
pub const DEFAULT_ID_BLOCK_SIZE: usize = 100;

/// Default ceiling for individually tracked removed ids.
pub const DEFAULT_MAX_REMOVED_IDS: usize = 1000;

/// Collection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageableConfig {
    /// Rows per page.
    pub page_size: usize,
    /// Ids (or rows) fetched per backend call when iterating.
    pub id_block_size: usize,
    /// Maximum number of removed ids the modification ledger tracks.
    pub max_removed_ids: usize,
    /// How `max_results` violations are detected when loading id lists.
    pub size_guard: SizeGuardStrategy,
    /// Selection mode of the collection's selection handler.
    pub select_mode: SelectMode,
    /// Drop the current selection when the query filter changes.
    pub clear_selection_on_filter_change: bool,
    /// What iterating a selection does with ids whose item vanished.
    pub gap_policy: GapPolicy,
}

impl Default for PageableConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            id_block_size: DEFAULT_ID_BLOCK_SIZE,
            max_removed_ids: DEFAULT_MAX_REMOVED_IDS,
            size_guard: SizeGuardStrategy::default(),
            select_mode: SelectMode::default(),
            clear_selection_on_filter_change: true,
            gap_policy: GapPolicy::default(),
        }
    }
}

impl PageableConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| PageableError::invalid_config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this configuration to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| PageableError::invalid_config(err.to_string()))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(PageableError::invalid_config("page_size must be positive"));
        }
        if self.id_block_size == 0 {
            return Err(PageableError::invalid_config(
                "id_block_size must be positive",
            ));
        }
        Ok(())
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the iteration block size.
    pub fn with_id_block_size(mut self, id_block_size: usize) -> Self {
        self.id_block_size = id_block_size;
        self
    }

    /// Set the removed-id ceiling.
    pub fn with_max_removed_ids(mut self, max_removed_ids: usize) -> Self {
        self.max_removed_ids = max_removed_ids;
        self
    }

    /// Set the result size guard strategy.
    pub fn with_size_guard(mut self, size_guard: SizeGuardStrategy) -> Self {
        self.size_guard = size_guard;
        self
    }

    /// Set the selection mode.
    pub fn with_select_mode(mut self, select_mode: SelectMode) -> Self {
        self.select_mode = select_mode;
        self
    }

    /// Keep or drop the selection on filter changes.
    pub fn with_clear_selection_on_filter_change(mut self, clear: bool) -> Self {
        self.clear_selection_on_filter_change = clear;
        self
    }

    /// Set the selection gap policy.
    pub fn with_gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PageableConfig::new();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.id_block_size, 100);
        assert_eq!(config.max_removed_ids, 1000);
        assert_eq!(config.size_guard, SizeGuardStrategy::SingleQuery);
        assert_eq!(config.select_mode, SelectMode::Multi);
        assert!(config.clear_selection_on_filter_change);
        assert_eq!(config.gap_policy, GapPolicy::Skip);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = PageableConfig::from_toml_str(
            r#"
            max_removed_ids = 50
            select_mode = "single"
            clear_selection_on_filter_change = false
            gap_policy = "fail"
            "#,
        )
        .unwrap();

        assert_eq!(config.page_size, 10);
        assert_eq!(config.max_removed_ids, 50);
        assert_eq!(config.select_mode, SelectMode::Single);
        assert!(!config.clear_selection_on_filter_change);
        assert_eq!(config.gap_policy, GapPolicy::Fail);
    }

    #[test]
    fn test_from_toml_rejects_zero_page_size() {
        let err = PageableConfig::from_toml_str("page_size = 0").unwrap_err();
        assert!(matches!(err, PageableError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_toml_rejects_unknown_guard() {
        let err = PageableConfig::from_toml_str(r#"size_guard = "guess""#).unwrap_err();
        assert!(matches!(err, PageableError::InvalidConfig(_)));
    }

    #[test]
    fn test_toml_round_trip_keeps_builder_values() {
        let config = PageableConfig::new()
            .with_page_size(50)
            .with_size_guard(SizeGuardStrategy::ExtraCount);
        let text = config.to_toml_string().unwrap();
        assert_eq!(PageableConfig::from_toml_str(&text).unwrap(), config);
    }
}
