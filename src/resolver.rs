//! Artifact resolution.
//!
//! Expands a provider's class locations into the concrete list of compiled
//! artifacts that execution data is cross-referenced against. Resolved lists
//! can be memoized process-wide per provider; the memo has an explicit
//! freshness bound and can be invalidated on demand.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::pattern::PathMatcher;
use crate::provider::ProviderConfig;

/// Include/exclude filter. Include is evaluated first, exclude always wins.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    include: Vec<PathMatcher>,
    exclude: Vec<PathMatcher>,
}

impl ArtifactFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: PathMatcher::parse_all(include)?,
            exclude: PathMatcher::parse_all(exclude)?,
        })
    }

    /// `path` is expected to be absolute.
    pub fn accepts(&self, path: &Path) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(path));

        debug!("File [{}] included: [{}]", path.display(), included);

        if let Some(pattern) = self.exclude.iter().find(|p| p.matches(path)) {
            debug!("[{}] excluded by pattern [{}]", path.display(), pattern);
            return false;
        }

        included
    }
}

/// Everything the resolver needs to know about one provider.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub name: String,
    pub roots: Vec<PathBuf>,
    pub filter: ArtifactFilter,
    pub cache_list: bool,
}

impl ArtifactSpec {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            roots: config.classes_locations.clone(),
            filter: ArtifactFilter::new(&config.include_patterns, &config.exclude_patterns)?,
            cache_list: config.enable_classes_cache,
        })
    }
}

struct CachedList {
    files: Arc<Vec<PathBuf>>,
    resolved_at: Instant,
}

type Slot = Arc<Mutex<Option<CachedList>>>;

/// Process-wide artifact list resolver.
pub struct ArtifactResolver {
    cache: DashMap<String, Slot>,
    ttl: Option<Duration>,
}

impl Default for ArtifactResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ArtifactResolver {
    /// `ttl = None` keeps a populated list until it is invalidated explicitly.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    pub fn resolve(&self, spec: &ArtifactSpec) -> Arc<Vec<PathBuf>> {
        if !spec.cache_list {
            return Arc::new(walk_artifacts(&spec.roots, &spec.filter));
        }

        // The per-provider mutex is held across the walk so concurrent scopes
        // populate a cold entry exactly once.
        let slot: Slot = self.cache.entry(spec.name.clone()).or_default().clone();
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = guard.as_ref() {
            let fresh = self
                .ttl
                .map(|ttl| cached.resolved_at.elapsed() < ttl)
                .unwrap_or(true);
            if fresh && !cached.files.is_empty() {
                debug!(
                    "Serving {} cached artifacts for [{}]",
                    cached.files.len(),
                    spec.name
                );
                return cached.files.clone();
            }
        }

        let files = Arc::new(walk_artifacts(&spec.roots, &spec.filter));
        *guard = Some(CachedList {
            files: files.clone(),
            resolved_at: Instant::now(),
        });
        debug!("Cache is filled! {} artifacts for [{}]", files.len(), spec.name);
        files
    }

    /// Drops the memoized list of one provider.
    pub fn invalidate(&self, name: &str) {
        if self.cache.remove(name).is_some() {
            info!("Artifact list cache invalidated for [{}]", name);
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
        info!("Artifact list cache invalidated for all providers");
    }

    /// Number of memoized artifacts for `name`, if any are cached.
    pub fn cached_len(&self, name: &str) -> Option<usize> {
        let slot = self.cache.get(name)?.clone();
        let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|c| c.files.len())
    }
}

/// Walks every root recursively and returns the accepted files, sorted.
pub fn walk_artifacts(roots: &[PathBuf], filter: &ArtifactFilter) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        debug!("Checking class file source [{}]", root.display());
        let root = match std::path::absolute(root) {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot resolve class location [{}]: {}", root.display(), e);
                continue;
            }
        };
        if !root.exists() {
            warn!("Class location [{}] does not exist", root.display());
            continue;
        }
        if root.is_file() {
            if filter.accepts(&root) {
                files.push(root);
            }
            continue;
        }
        walk_dir(&root, filter, &mut files);
    }

    files.sort();
    files.dedup();
    files
}

fn walk_dir(dir: &Path, filter: &ArtifactFilter, out: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under [{}]: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if filter.accepts(&path) {
            debug!("File [{}] added to coverage scan.", path.display());
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_include_accepts_everything() {
        let filter = ArtifactFilter::new(&[], &[]).unwrap();
        assert!(filter.accepts(Path::new("/x/anything.bin")));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = ArtifactFilter::new(
            &strings(&["glob:**.class"]),
            &strings(&["glob:**/generated/**"]),
        )
        .unwrap();
        assert!(filter.accepts(Path::new("/app/com/A.class")));
        assert!(!filter.accepts(Path::new("/app/generated/B.class")));
        assert!(!filter.accepts(Path::new("/app/com/A.txt")));
    }

    #[test]
    fn test_exclude_without_include() {
        let filter = ArtifactFilter::new(&[], &strings(&["glob:**.txt"])).unwrap();
        assert!(filter.accepts(Path::new("/app/A.class")));
        assert!(!filter.accepts(Path::new("/app/README.txt")));
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let filter = ArtifactFilter::default();
        let files = walk_artifacts(&[PathBuf::from("/definitely/not/here/xyz")], &filter);
        assert!(files.is_empty());
    }
}
