//! On-disk route table cache.
//!
//! The cache file holds `base64(json({ version, table }))`. Freshness is decided
//! purely from modification times, compared at whole-second resolution: a
//! route file saved within the same second as the cache is written is not
//! detected as newer. Concurrent rebuilds from several processes are not
//! coordinated; the last writer wins and a torn file is rejected on load.

use crate::error::{CacheError, ServerResult};
use crate::router::RouteTable;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Bump whenever the serialized shape of [`RouteTable`] changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No cache file yet.
    Cold,
    /// A tracked route file is newer than the cache file.
    Stale,
    /// The cache file is at least as new as every tracked route file.
    Fresh,
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    table: &'a RouteTable,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Deserialize)]
struct OwnedEnvelope {
    table: RouteTable,
}

#[derive(Debug, Clone)]
pub struct RouteCacheManager {
    path: PathBuf,
}

impl RouteCacheManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Classifies the cache file against the route files it was built from.
    pub fn state<P: AsRef<Path>>(&self, tracked: &[P]) -> ServerResult<CacheState> {
        let cached_at = match fs::metadata(&self.path) {
            Ok(metadata) => modified_secs(&metadata)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(cache = %self.path.display(), "route cache is cold");
                return Ok(CacheState::Cold);
            }
            Err(err) => return Err(err.into()),
        };

        for file in tracked {
            let file = file.as_ref();
            let modified = modified_secs(&fs::metadata(file)?)?;
            if modified > cached_at {
                debug!(
                    cache = %self.path.display(),
                    file = %file.display(),
                    "route cache is stale"
                );
                return Ok(CacheState::Stale);
            }
        }

        debug!(cache = %self.path.display(), "route cache is fresh");
        Ok(CacheState::Fresh)
    }

    /// Writes `table` to the cache file and returns the table as loaded back from it.
    pub fn store(&self, table: &RouteTable) -> Result<RouteTable, CacheError> {
        let blob = Self::encode(table)?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(&self.path, blob.as_bytes())?;
        info!(
            cache = %self.path.display(),
            routes = table.route_count(),
            bytes = blob.len(),
            "route cache rebuilt"
        );
        self.load()
    }

    pub fn load(&self) -> Result<RouteTable, CacheError> {
        let blob = fs::read_to_string(&self.path)?;
        Self::decode(&blob)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn encode(table: &RouteTable) -> Result<String, CacheError> {
        let json = serde_json::to_vec(&Envelope {
            version: CACHE_FORMAT_VERSION,
            table,
        })?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    pub fn decode(blob: &str) -> Result<RouteTable, CacheError> {
        let json = base64::engine::general_purpose::STANDARD.decode(blob.trim())?;
        let probe: VersionProbe = serde_json::from_slice(&json)?;
        if probe.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Version {
                found: probe.version,
                expected: CACHE_FORMAT_VERSION,
            });
        }
        let envelope: OwnedEnvelope = serde_json::from_slice(&json)?;
        Ok(envelope.table)
    }
}

fn modified_secs(metadata: &fs::Metadata) -> io::Result<u64> {
    Ok(to_cache_secs(metadata.modified()?))
}

/// Seconds since the epoch for `time`, at the resolution staleness checks use.
pub fn to_cache_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::router::RouteCollector;
    use std::fs::File;
    use std::time::Duration;

    fn sample_table() -> RouteTable {
        let mut collector = RouteCollector::new();
        collector
            .get("/", "home")
            .get("/users/{id:i}", "UserController@show")
            .filter("auth", "auth");
        collector.into_table().unwrap()
    }

    fn touch(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn encode_decode_round_trip() {
        let table = sample_table();
        let blob = RouteCacheManager::encode(&table).unwrap();
        let restored = RouteCacheManager::decode(&blob).unwrap();
        assert_eq!(restored, table);
        assert_eq!(RouteCacheManager::encode(&restored).unwrap(), blob);
    }

    #[test]
    fn rejects_foreign_versions_and_garbage() {
        let json = serde_json::json!({ "version": CACHE_FORMAT_VERSION + 1, "table": {} });
        let blob = base64::engine::general_purpose::STANDARD.encode(json.to_string());
        assert!(matches!(
            RouteCacheManager::decode(&blob),
            Err(CacheError::Version { .. })
        ));
        assert!(matches!(
            RouteCacheManager::decode("%%% not base64"),
            Err(CacheError::Encoding(_))
        ));
        let truncated = base64::engine::general_purpose::STANDARD.encode("{\"version\":1,\"tab");
        assert!(matches!(
            RouteCacheManager::decode(&truncated),
            Err(CacheError::Format(_))
        ));
    }

    #[test]
    fn state_follows_modification_times() {
        let dir = tempfile::tempdir().unwrap();
        let routes = dir.path().join("web.toml");
        fs::write(&routes, "").unwrap();
        let manager = RouteCacheManager::new(dir.path().join("cache/routes.cache"));

        assert_eq!(manager.state(&[&routes]).unwrap(), CacheState::Cold);

        manager.store(&sample_table()).unwrap();
        let now = SystemTime::now();
        touch(manager.path(), now);
        touch(&routes, now - Duration::from_secs(60));
        assert_eq!(manager.state(&[&routes]).unwrap(), CacheState::Fresh);

        touch(&routes, now + Duration::from_secs(60));
        assert_eq!(manager.state(&[&routes]).unwrap(), CacheState::Stale);
    }

    #[test]
    fn same_second_edits_count_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let routes = dir.path().join("web.toml");
        fs::write(&routes, "").unwrap();
        let manager = RouteCacheManager::new(dir.path().join("routes.cache"));
        manager.store(&sample_table()).unwrap();

        let second = UNIX_EPOCH + Duration::from_secs(to_cache_secs(SystemTime::now()));
        touch(manager.path(), second);
        touch(&routes, second + Duration::from_millis(500));
        assert_eq!(manager.state(&[&routes]).unwrap(), CacheState::Fresh);
    }

    #[test]
    fn store_returns_loaded_table() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RouteCacheManager::new(dir.path().join("routes.cache"));
        let table = sample_table();
        let loaded = manager.store(&table).unwrap();
        assert_eq!(loaded, table);
        assert!(loaded.static_routes()[""].contains_key(&Method::GET));

        manager.clear().unwrap();
        manager.clear().unwrap();
        assert!(!manager.path().exists());
    }
}
