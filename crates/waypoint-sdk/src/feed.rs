//! Supplementary feed categories fetched in parallel.
//!
//! Categories are independent and read-only. One category failing or
//! timing out never aborts the others; the caller receives whatever
//! succeeded plus a list of failures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use waypoint_core::{Result, WaypointError};

/// One entry in a feed category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn new(category: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
            summary: None,
            url: None,
            published_at: None,
        }
    }
}

/// Supplies the items for one category.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    async fn fetch(&self, category: &str) -> Result<Vec<FeedItem>>;
}

/// A category that could not be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFailure {
    pub category: String,
    pub error: WaypointError,
}

/// Outcome of fetching a set of categories.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    /// Items per successfully fetched category.
    pub items: BTreeMap<String, Vec<FeedItem>>,

    /// Failed categories, sorted by name.
    pub failures: Vec<FeedFailure>,
}

impl FeedBatch {
    /// Every category succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Some, but not all, categories succeeded.
    pub fn is_partial(&self) -> bool {
        !self.items.is_empty() && !self.failures.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_per_category_timeout_ms() -> u64 {
    10_000
}

/// Limits for [`FeedAggregator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Categories fetched at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_per_category_timeout_ms")]
    pub per_category_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            per_category_timeout_ms: default_per_category_timeout_ms(),
        }
    }
}

/// Fetches categories from a [`FeedSource`] with bounded parallelism.
pub struct FeedAggregator<F: FeedSource> {
    source: Arc<F>,
    config: FeedConfig,
}

impl<F: FeedSource> FeedAggregator<F> {
    pub fn new(source: F) -> Self {
        Self::with_config(source, FeedConfig::default())
    }

    pub fn with_config(source: F, config: FeedConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
        }
    }

    /// Fetch every category, isolating failures. Duplicate names are
    /// fetched once.
    pub async fn fetch_all<I, S>(&self, categories: I) -> FeedBatch
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: BTreeSet<String> = categories.into_iter().map(Into::into).collect();
        let limit = Duration::from_millis(self.config.per_category_timeout_ms);
        let requested = categories.len();

        let tasks = categories.into_iter().map(|category| {
            let source = self.source.clone();
            async move {
                let name = category.clone();
                let joined = tokio::spawn(async move {
                    match tokio::time::timeout(limit, source.fetch(&category)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(WaypointError::Timeout {
                            duration_ms: limit.as_millis() as u64,
                            message: format!("feed category '{}'", category),
                        }),
                    }
                })
                .await;

                let outcome = joined.unwrap_or_else(|e| {
                    Err(WaypointError::Internal(format!("feed task failed: {}", e)))
                });
                (name, outcome)
            }
        });

        let results: Vec<_> = stream::iter(tasks)
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut batch = FeedBatch::default();
        for (category, outcome) in results {
            match outcome {
                Ok(items) => {
                    debug!("Feed category '{}' returned {} items", category, items.len());
                    batch.items.insert(category, items);
                }
                Err(error) => {
                    warn!("Feed category '{}' failed: {}", category, error);
                    batch.failures.push(FeedFailure { category, error });
                }
            }
        }
        batch.failures.sort_by(|a, b| a.category.cmp(&b.category));

        info!(
            "Fetched {}/{} feed categories",
            batch.items.len(),
            requested
        );
        batch
    }
}
