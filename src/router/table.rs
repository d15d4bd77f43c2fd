//! The route table: static routes, grouped variable routes, the filter
//! registry and the before-all hook.
//!
//! Tables are plain data. Handlers and filters are referenced by name so a
//! table can be serialized into the route cache and loaded back unchanged.

use crate::error::{ServerError, ServerResult};
use crate::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of variable routes folded into one alternation regex.
pub const GROUP_CHUNK_SIZE: usize = 10;

/// What a route points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerRef {
    /// A callable registered in the [`HandlerRegistry`](crate::handler::HandlerRegistry).
    Closure { name: String },
    /// A controller action, resolved through the controller factory.
    Controller { controller: String, method: String },
}

impl HandlerRef {
    pub fn closure(name: impl Into<String>) -> Self {
        HandlerRef::Closure { name: name.into() }
    }

    pub fn controller(controller: impl Into<String>, method: impl Into<String>) -> Self {
        HandlerRef::Controller {
            controller: controller.into(),
            method: method.into(),
        }
    }

    /// `"UserController@show"` is a controller action, anything else a closure name.
    pub fn parse(target: &str) -> Self {
        match target.split_once('@') {
            Some((controller, method)) => HandlerRef::controller(controller, method),
            None => HandlerRef::closure(target),
        }
    }
}

impl From<&str> for HandlerRef {
    fn from(target: &str) -> Self {
        HandlerRef::parse(target)
    }
}

impl From<String> for HandlerRef {
    fn from(target: String) -> Self {
        HandlerRef::parse(&target)
    }
}

/// Filter names attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// `outer` filters (from an enclosing group) come first.
    pub fn nested(outer: &FilterSpec, inner: &FilterSpec) -> FilterSpec {
        FilterSpec {
            before: outer.before.iter().chain(&inner.before).cloned().collect(),
            after: outer.after.iter().chain(&inner.after).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub handler: HandlerRef,
    #[serde(default)]
    pub filters: FilterSpec,
}

impl RouteEntry {
    pub fn new(handler: impl Into<HandlerRef>) -> Self {
        Self {
            handler: handler.into(),
            filters: FilterSpec::default(),
        }
    }

    pub fn with_filters(mut self, filters: FilterSpec) -> Self {
        self.filters = filters;
        self
    }
}

/// One variable pattern and the handlers registered for it per method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRoute {
    pub regex: String,
    pub variables: Vec<String>,
    pub methods: BTreeMap<Method, RouteEntry>,
}

impl VariableRoute {
    pub fn new(regex: impl Into<String>, variables: Vec<String>) -> Self {
        Self {
            regex: regex.into(),
            variables,
            methods: BTreeMap::new(),
        }
    }

    fn validate(&self) -> ServerResult<()> {
        let compiled = Regex::new(&self.regex)
            .map_err(|err| ServerError::invalid_route(&self.regex, err.to_string()))?;
        let groups = compiled.captures_len() - 1;
        if groups != self.variables.len() {
            return Err(ServerError::invalid_route(
                &self.regex,
                format!(
                    "{} capture groups for {} declared variables",
                    groups,
                    self.variables.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Several variable routes compiled into a single anchored alternation.
///
/// Each alternative is followed by an empty `()` marker group that always
/// participates when that alternative matches, so the number of captures up to
/// the last participating group identifies the alternative. `route_map` is
/// keyed by that capture count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GroupRepr", into = "GroupRepr")]
pub struct VariableRouteGroup {
    regex: Regex,
    route_map: BTreeMap<usize, VariableRoute>,
}

#[derive(Serialize, Deserialize)]
struct GroupRepr {
    routes: Vec<VariableRoute>,
}

impl TryFrom<GroupRepr> for VariableRouteGroup {
    type Error = ServerError;

    fn try_from(repr: GroupRepr) -> Result<Self, Self::Error> {
        VariableRouteGroup::build(repr.routes)
    }
}

impl From<VariableRouteGroup> for GroupRepr {
    fn from(group: VariableRouteGroup) -> Self {
        GroupRepr {
            routes: group.route_map.into_values().collect(),
        }
    }
}

impl PartialEq for VariableRouteGroup {
    fn eq(&self, other: &Self) -> bool {
        self.route_map == other.route_map
    }
}

impl VariableRouteGroup {
    pub fn build(routes: Vec<VariableRoute>) -> ServerResult<Self> {
        let mut source = String::from("^(?:");
        let mut route_map = BTreeMap::new();
        let mut last_group = 0;

        for (index, route) in routes.into_iter().enumerate() {
            if index > 0 {
                source.push('|');
            }
            source.push_str(&format!("(?:{})()", route.regex));
            last_group += route.variables.len() + 1;
            route_map.insert(last_group + 1, route);
        }
        source.push_str(")$");

        let regex =
            Regex::new(&source).map_err(|err| ServerError::invalid_route(&source, err.to_string()))?;
        if regex.captures_len() != last_group + 1 {
            return Err(ServerError::invalid_route(
                &source,
                "capture groups do not line up with declared variables",
            ));
        }

        Ok(Self { regex, route_map })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn len(&self) -> usize {
        self.route_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.route_map.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &VariableRoute> {
        self.route_map.values()
    }

    /// Matches `path` against the group; returns the winning route and the
    /// variables that captured a non-empty value, in declared order.
    pub fn match_path(&self, path: &str) -> Option<(&VariableRoute, Vec<(String, String)>)> {
        let captures = self.regex.captures(path)?;
        let count = (0..captures.len())
            .rev()
            .find(|&index| captures.get(index).is_some())
            .map_or(0, |index| index + 1);

        // Probe upwards from the participating count to the first registered route.
        let (&key, route) = self.route_map.range(count..).next()?;
        let first = key - 1 - route.variables.len();

        let variables = route
            .variables
            .iter()
            .enumerate()
            .filter_map(|(offset, name)| {
                captures
                    .get(first + offset)
                    .map(|value| value.as_str())
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect();

        Some((route, variables))
    }

    fn into_routes(self) -> Vec<VariableRoute> {
        self.route_map.into_values().collect()
    }
}

/// A named filter and the registered callback implementing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBinding {
    pub name: String,
    pub callback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeAll {
    pub methods: Vec<String>,
    pub callback: String,
}

impl BeforeAll {
    pub fn new<M: AsRef<str>>(methods: &[M], callback: impl Into<String>) -> Self {
        Self {
            methods: methods.iter().map(|m| m.as_ref().to_string()).collect(),
            callback: callback.into(),
        }
    }

    pub fn applies_to(&self, method: Method) -> bool {
        self.methods
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(method.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteTable {
    static_routes: BTreeMap<String, BTreeMap<Method, RouteEntry>>,
    variable_routes: Vec<VariableRouteGroup>,
    filters: Vec<FilterBinding>,
    before_all: Option<BeforeAll>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_static(&mut self, path: &str, method: Method, entry: RouteEntry) {
        self.static_routes
            .entry(path.trim_matches('/').to_string())
            .or_default()
            .insert(method, entry);
    }

    /// Registers `entry` for `method` under a variable pattern. A pattern that
    /// is already present gains the method (last write wins); a new one is
    /// appended to the last group, opening a new group when it is full.
    pub fn add_variable(
        &mut self,
        regex: &str,
        method: Method,
        entry: RouteEntry,
        variables: Vec<String>,
    ) -> ServerResult<()> {
        let position = self
            .variable_routes
            .iter()
            .position(|group| group.routes().any(|route| route.regex == regex));

        let (index, mut routes) = match position {
            Some(index) => (index, self.variable_routes[index].clone().into_routes()),
            None => match self.variable_routes.last() {
                Some(group) if group.len() < GROUP_CHUNK_SIZE => {
                    (self.variable_routes.len() - 1, group.clone().into_routes())
                }
                _ => (self.variable_routes.len(), Vec::new()),
            },
        };

        match routes.iter_mut().find(|route| route.regex == regex) {
            Some(route) => {
                route.variables = variables;
                route.methods.insert(method, entry);
                route.validate()?;
            }
            None => {
                let mut route = VariableRoute::new(regex, variables);
                route.validate()?;
                route.methods.insert(method, entry);
                routes.push(route);
            }
        }

        let group = VariableRouteGroup::build(routes)?;
        if index == self.variable_routes.len() {
            self.variable_routes.push(group);
        } else {
            self.variable_routes[index] = group;
        }
        Ok(())
    }

    /// Appends already-collected variable routes in chunks of [`GROUP_CHUNK_SIZE`].
    pub fn extend_variable_routes(&mut self, routes: Vec<VariableRoute>) -> ServerResult<()> {
        let mut routes = routes.into_iter().peekable();
        while routes.peek().is_some() {
            let chunk: Vec<VariableRoute> = routes.by_ref().take(GROUP_CHUNK_SIZE).collect();
            for route in &chunk {
                route.validate()?;
            }
            self.variable_routes.push(VariableRouteGroup::build(chunk)?);
        }
        Ok(())
    }

    /// Registers or replaces a filter, keeping its original registration position.
    pub fn add_filter(&mut self, name: impl Into<String>, callback: impl Into<String>) {
        let name = name.into();
        let callback = callback.into();
        match self.filters.iter_mut().find(|binding| binding.name == name) {
            Some(binding) => binding.callback = callback,
            None => self.filters.push(FilterBinding { name, callback }),
        }
    }

    pub fn set_before_all(&mut self, before_all: Option<BeforeAll>) {
        self.before_all = before_all;
    }

    /// Folds `other` into this table: its static paths replace ours wholesale,
    /// its variable groups are tried after ours and its filters override ours.
    /// The before-all hook is left untouched.
    pub fn merge(&mut self, other: RouteTable) {
        self.static_routes.extend(other.static_routes);
        self.variable_routes.extend(other.variable_routes);
        for binding in other.filters {
            self.add_filter(binding.name, binding.callback);
        }
    }

    pub fn static_routes(&self) -> &BTreeMap<String, BTreeMap<Method, RouteEntry>> {
        &self.static_routes
    }

    pub fn variable_routes(&self) -> &[VariableRouteGroup] {
        &self.variable_routes
    }

    pub fn filters(&self) -> &[FilterBinding] {
        &self.filters
    }

    pub fn before_all(&self) -> Option<&BeforeAll> {
        self.before_all.as_ref()
    }

    pub fn route_count(&self) -> usize {
        let statics: usize = self.static_routes.values().map(BTreeMap::len).sum();
        let variables: usize = self
            .variable_routes
            .iter()
            .flat_map(VariableRouteGroup::routes)
            .map(|route| route.methods.len())
            .sum();
        statics + variables
    }

    pub fn is_empty(&self) -> bool {
        self.route_count() == 0
    }
}
