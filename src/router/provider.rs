use crate::cache::{CacheState, RouteCacheManager};
use crate::config::RoutingConfig;
use crate::error::ServerResult;
use crate::router::collector::RouteCollector;
use crate::router::loader::collect_files;
use crate::router::table::RouteTable;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Builds the route table for a process from configuration.
///
/// With the cache enabled, the cacheable subset of route files is served from
/// the cache file when it is fresh and rebuilt otherwise; the remaining route
/// files are always collected from source and merged on top.
#[derive(Debug, Clone)]
pub struct RouteTableProvider {
    config: RoutingConfig,
    cache: Option<RouteCacheManager>,
}

impl RouteTableProvider {
    pub fn new(config: RoutingConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| RouteCacheManager::new(config.cache_path()));
        Self { config, cache }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&RouteCacheManager> {
        self.cache.as_ref()
    }

    pub fn load(&self) -> ServerResult<RouteTable> {
        let Some(cache) = &self.cache else {
            let table = self.collect(&self.config.route_files())?;
            info!(routes = table.route_count(), "route table collected");
            return Ok(table);
        };

        let cacheable = self.config.cacheable_route_files();
        let mut table = self.load_cached(cache, &cacheable)?;

        let uncached: Vec<PathBuf> = self
            .config
            .route_files()
            .into_iter()
            .filter(|file| !cacheable.contains(file))
            .collect();
        if !uncached.is_empty() {
            debug!(files = uncached.len(), "merging uncached route files");
            table.merge(self.collect(&uncached)?);
        }

        info!(routes = table.route_count(), "route table ready");
        Ok(table)
    }

    fn load_cached(&self, cache: &RouteCacheManager, cacheable: &[PathBuf]) -> ServerResult<RouteTable> {
        let mut tracked = cacheable.to_vec();
        tracked.extend(self.existing_filters_file());

        if cache.state(&tracked)? == CacheState::Fresh {
            match cache.load() {
                Ok(table) => return Ok(table),
                Err(err) => warn!(
                    cache = %cache.path().display(),
                    error = %err,
                    "discarding unreadable route cache"
                ),
            }
        }

        let table = self.collect(cacheable)?;
        Ok(cache.store(&table)?)
    }

    /// Collects the filters file (when present) followed by `files`.
    fn collect(&self, files: &[PathBuf]) -> ServerResult<RouteTable> {
        let mut collector = RouteCollector::new();
        let filters: Vec<PathBuf> = self.existing_filters_file().into_iter().collect();
        collect_files(&mut collector, &filters, &self.config.api_prefix)?;
        collect_files(&mut collector, files, &self.config.api_prefix)?;
        collector.into_table()
    }

    fn existing_filters_file(&self) -> Option<PathBuf> {
        self.config.filters_path().filter(|path| path.is_file())
    }
}
