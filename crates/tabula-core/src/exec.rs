//! Execution primitive seam.
//!
//! The planner only produces SQL text and parameters; anything able to run
//! them and hand back labeled rows implements [`Executor`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::planner::{CompiledQuery, CountQuery, CountStrategy};
use crate::value::Record;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    /// All rows, each keyed by result label.
    async fn fetch_rows(&self, query: &CompiledQuery) -> Result<Vec<Record>>;

    /// First column of the first row.
    async fn fetch_scalar(&self, query: &CompiledQuery) -> Result<i64>;
}

/// Runs a count query with the strategy it was compiled for.
pub async fn count<E: Executor + ?Sized>(executor: &E, query: &CountQuery) -> Result<u64> {
    match query.strategy {
        CountStrategy::Scalar => Ok(executor.fetch_scalar(&query.query).await?.max(0) as u64),
        CountStrategy::MaterializedRows => Ok(executor.fetch_rows(&query.query).await?.len() as u64),
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Rows(Vec<Record>),
    Scalar(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Cached,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires.map_or(true, |at| Instant::now() < at)
    }
}

/// Result cache in front of another executor. Only queries compiled with an
/// enabled result cache are stored; entries expire after their lifetime.
pub struct CachingExecutor<E> {
    inner: E,
    entries: DashMap<String, Entry>,
}

impl<E: Executor> CachingExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner, entries: DashMap::new() }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn lookup(&self, key: &str) -> Option<Cached> {
        let hit = self.entries.get(key).filter(|e| e.is_live()).map(|e| e.value.clone());
        if hit.is_none() {
            self.entries.remove_if(key, |_, e| !e.is_live());
        }
        hit
    }

    fn store(&self, query: &CompiledQuery, value: Cached) {
        let expires = query
            .cache
            .result_cache
            .lifetime
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(query.cache_key(), Entry { value, expires });
    }
}

#[async_trait]
impl<E: Executor> Executor for CachingExecutor<E> {
    #[instrument(level = "debug", skip_all)]
    async fn fetch_rows(&self, query: &CompiledQuery) -> Result<Vec<Record>> {
        if !query.cache.result_cache.enabled {
            return self.inner.fetch_rows(query).await;
        }
        let key = query.cache_key();
        if let Some(Cached::Rows(rows)) = self.lookup(&key) {
            debug!(rows = rows.len(), "result cache hit");
            return Ok(rows);
        }
        let rows = self.inner.fetch_rows(query).await?;
        self.store(query, Cached::Rows(rows.clone()));
        Ok(rows)
    }

    #[instrument(level = "debug", skip_all)]
    async fn fetch_scalar(&self, query: &CompiledQuery) -> Result<i64> {
        if !query.cache.result_cache.enabled {
            return self.inner.fetch_scalar(query).await;
        }
        let key = query.cache_key();
        if let Some(Cached::Scalar(n)) = self.lookup(&key) {
            debug!(value = n, "result cache hit");
            return Ok(n);
        }
        let n = self.inner.fetch_scalar(query).await?;
        self.store(query, Cached::Scalar(n));
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::CacheOptions;
    use crate::table::ResultCache;
    use serde_json::json;

    fn query(cache: ResultCache) -> CompiledQuery {
        CompiledQuery::new(
            "SELECT COUNT(DISTINCT `post`.`id`) FROM `posts` AS `post`".into(),
            Vec::new(),
            CacheOptions { use_query_cache: false, result_cache: cache },
        )
    }

    #[tokio::test]
    async fn scalar_and_materialized_counts() {
        let mut mock = MockExecutor::new();
        mock.expect_fetch_scalar().returning(|_| Ok(-1));
        mock.expect_fetch_rows()
            .returning(|_| Ok(vec![Record::new(), Record::new(), Record::new()]));

        let scalar = CountQuery { query: query(ResultCache::default()), strategy: CountStrategy::Scalar };
        assert_eq!(count(&mock, &scalar).await.unwrap(), 0);
        let rows = CountQuery { strategy: CountStrategy::MaterializedRows, ..scalar };
        assert_eq!(count(&mock, &rows).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn cached_results_skip_the_inner_executor() {
        let mut mock = MockExecutor::new();
        mock.expect_fetch_scalar().times(1).returning(|_| Ok(42));
        let mut row = Record::new();
        row.insert("post__id".into(), json!(1));
        mock.expect_fetch_rows().times(2).returning(move |_| Ok(vec![row.clone()]));

        let exec = CachingExecutor::new(mock);
        let cached = query(ResultCache::enabled(Some(60), None));
        assert_eq!(exec.fetch_scalar(&cached).await.unwrap(), 42);
        assert_eq!(exec.fetch_scalar(&cached).await.unwrap(), 42);
        assert_eq!(exec.len(), 1);

        let uncached = query(ResultCache::default());
        exec.fetch_rows(&uncached).await.unwrap();
        exec.fetch_rows(&uncached).await.unwrap();
        assert_eq!(exec.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let mut mock = MockExecutor::new();
        mock.expect_fetch_scalar().times(2).returning(|_| Ok(7));

        let exec = CachingExecutor::new(mock);
        let q = query(ResultCache::enabled(Some(0), Some("posts_total")));
        exec.fetch_scalar(&q).await.unwrap();
        exec.fetch_scalar(&q).await.unwrap();
    }
}
