//! Request-scoped coverage cache.
//!
//! A [`CoverageScope`] lives for one external trigger (a scrape, a report,
//! a reset call). Within it every provider is fetched and analyzed at most
//! once; the outcome, success or failure, is shared by every reader. The
//! scope is torn down explicitly with [`CoverageScope::close`].

use ahash::AHashMap as HashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::coverage::BundleCoverage;
use crate::error::Result;
use crate::provider::CoverageSource;

type Entry = Arc<OnceCell<Result<Arc<BundleCoverage>>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub struct CoverageScope {
    entries: Mutex<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CoverageScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized result for `name`, running `compute` on first use.
    ///
    /// Concurrent callers for the same name wait for the first computation.
    pub fn get_or_compute<F>(&self, name: &str, compute: F) -> Result<Arc<BundleCoverage>>
    where
        F: FnOnce() -> Result<BundleCoverage>,
    {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.entry(name.to_string()).or_default().clone()
        };

        let mut computed = false;
        let result = entry.get_or_init(|| {
            computed = true;
            compute().map(Arc::new)
        });

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        result.clone()
    }

    /// Coverage of `source`, computed through the source's full pipeline.
    pub fn coverage(&self, source: &dyn CoverageSource) -> Result<Arc<BundleCoverage>> {
        self.get_or_compute(source.name(), || source.coverage())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ScopeStats {
        ScopeStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Ends the scope, dropping every cached tree.
    pub fn close(self) -> ScopeStats {
        let stats = self.stats();
        debug!(
            "Coverage scope closed: {} entries, {} hits, {} misses",
            self.len(),
            stats.hits,
            stats.misses
        );
        stats
    }
}
