//! Declarative route-definition files.
//!
//! ```toml
//! [[filter]]
//! name = "auth"
//! callback = "auth"
//!
//! [before_all]
//! methods = ["POST"]
//! callback = "csrf"
//!
//! [[route]]
//! method = "GET"
//! path = "/users/{id:i}"
//! handler = "UserController@show"
//! before = ["auth"]
//!
//! [[group]]
//! prefix = "/admin"
//! before = ["auth"]
//!
//!   [[group.route]]
//!   methods = ["GET", "POST"]
//!   path = "/settings"
//!   handler = "admin.settings"
//! ```

use crate::error::{ServerError, ServerResult};
use crate::http::Method;
use crate::router::collector::RouteCollector;
use crate::router::table::FilterSpec;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteFile {
    #[serde(default, rename = "filter")]
    pub filters: Vec<FilterDef>,
    #[serde(default)]
    pub before_all: Option<BeforeAllDef>,
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteDef>,
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDef {
    pub name: String,
    pub callback: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeAllDef {
    pub methods: Vec<String>,
    pub callback: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MethodList {
    One(Method),
    Many(Vec<Method>),
}

impl MethodList {
    fn as_slice(&self) -> &[Method] {
        match self {
            MethodList::One(method) => std::slice::from_ref(method),
            MethodList::Many(methods) => methods,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDef {
    #[serde(alias = "methods")]
    pub method: MethodList,
    pub path: String,
    pub handler: String,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDef {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteDef>,
}

impl RouteFile {
    pub fn parse(path: &Path, contents: &str) -> ServerResult<Self> {
        toml::from_str(contents).map_err(|err| ServerError::RouteFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn read(path: &Path) -> ServerResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| ServerError::RouteFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(path, &contents)
    }

    /// Feeds every declaration in this file into `collector`.
    pub fn register(&self, collector: &mut RouteCollector) {
        for filter in &self.filters {
            collector.filter(&filter.name, &filter.callback);
        }
        if let Some(hook) = &self.before_all {
            collector.before_all(hook.methods.as_slice(), &hook.callback);
        }
        for route in &self.routes {
            register_route(collector, route);
        }
        for group in &self.groups {
            let filters = FilterSpec {
                before: group.before.clone(),
                after: group.after.clone(),
            };
            collector.group(&group.prefix, filters, |inner| {
                for route in &group.routes {
                    register_route(inner, route);
                }
            });
        }
    }
}

fn register_route(collector: &mut RouteCollector, route: &RouteDef) {
    let filters = FilterSpec {
        before: route.before.clone(),
        after: route.after.clone(),
    };
    collector.route(route.method.as_slice(), &route.path, route.handler.as_str(), filters);
}

/// Whether a route file is mounted under the API prefix (`api.toml`, `api_*.toml`).
pub fn is_api_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem == "api" || stem.starts_with("api_"))
}

/// Collects `files` into `collector`, mounting API files under `api_prefix`.
pub fn collect_files<P: AsRef<Path>>(
    collector: &mut RouteCollector,
    files: &[P],
    api_prefix: &str,
) -> ServerResult<()> {
    for file in files {
        let file = file.as_ref();
        let definitions = RouteFile::read(file)?;
        debug!(
            file = %file.display(),
            routes = definitions.routes.len(),
            groups = definitions.groups.len(),
            "collecting route file"
        );
        if is_api_file(file) {
            collector.group(api_prefix, FilterSpec::default(), |api| {
                definitions.register(api);
            });
        } else {
            definitions.register(collector);
        }
    }
    Ok(())
}
