//! Routing configuration, usually read from a TOML file:
//!
//! ```toml
//! base_path = "/srv/app"
//! routes = ["web.toml", "api.toml"]
//! controller_namespace = "app::http::controllers"
//!
//! [cache]
//! enabled = true
//! routes = ["web.toml"]
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Root against which relative paths below are resolved.
    pub base_path: PathBuf,
    /// Directory holding route-definition files.
    pub route_path: PathBuf,
    /// Every route file of the application, in load order.
    pub routes: Vec<String>,
    /// Filter declarations collected ahead of every route file.
    pub filters_file: Option<String>,
    /// Prefix applied to `api.toml` and `api_*.toml` route files.
    pub api_prefix: String,
    pub controller_namespace: String,
    pub cache: RouteCacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteCacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// The cacheable subset of `routes`.
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            route_path: PathBuf::from("routes"),
            routes: Vec::new(),
            filters_file: Some("filters.toml".to_string()),
            api_prefix: "/api".to_string(),
            controller_namespace: "app::http::controllers".to_string(),
            cache: RouteCacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("bootstrap/cache/routes.cache"),
            routes: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RoutingConfig {
    pub fn from_toml_str(contents: &str) -> ServerResult<Self> {
        let config: RoutingConfig =
            toml::from_str(contents).map_err(|err| ServerError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file; a relative `base_path` is taken relative to the file's directory.
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| ServerError::Config(format!("{}: {}", path.display(), err)))?;
        let mut config = Self::from_toml_str(&contents)?;
        if config.base_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.base_path = dir.join(&config.base_path);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.cache.enabled && self.cache.path.as_os_str().is_empty() {
            return Err(ServerError::Config("cache.path must be set when the cache is enabled".into()));
        }
        for name in self.routes.iter().chain(&self.cache.routes) {
            if name.trim().is_empty() {
                return Err(ServerError::Config("route file names must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn route_dir(&self) -> PathBuf {
        self.base_path.join(&self.route_path)
    }

    pub fn route_file(&self, name: &str) -> PathBuf {
        self.route_dir().join(name.trim_start_matches('/'))
    }

    pub fn route_files(&self) -> Vec<PathBuf> {
        self.routes.iter().map(|name| self.route_file(name)).collect()
    }

    pub fn cacheable_route_files(&self) -> Vec<PathBuf> {
        self.cache.routes.iter().map(|name| self.route_file(name)).collect()
    }

    pub fn filters_path(&self) -> Option<PathBuf> {
        self.filters_file.as_deref().map(|name| self.route_file(name))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.base_path.join(&self.cache.path)
    }
}
