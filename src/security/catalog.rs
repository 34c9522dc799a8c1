//! Record cap for the catalog collection.
//!
//! The cap is a soft limit: the length read here and the insert performed
//! by the router are separate steps, so two concurrent inserts that both
//! observe `max_records - 1` can each succeed.

use axum::http::Method;

use crate::config::CatalogConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCap {
    collection: String,
    max_records: usize,
}

impl CatalogCap {
    pub fn new(collection: impl Into<String>, max_records: usize) -> Self {
        Self {
            collection: collection.into(),
            max_records,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.collection.clone(), config.max_records)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Only a `POST` inserting into the capped collection is checked.
    ///
    /// `target` is the decoded collection name of a `/{resource}` route, or
    /// `None` for any other route.
    pub fn applies_to(&self, method: &Method, target: Option<&str>) -> bool {
        *method == Method::POST && target == Some(self.collection.as_str())
    }

    pub fn is_full(&self, current_len: usize) -> bool {
        current_len >= self.max_records
    }
}

impl Default for CatalogCap {
    fn default() -> Self {
        Self::from_config(&CatalogConfig::default())
    }
}
