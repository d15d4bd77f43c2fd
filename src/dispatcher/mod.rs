//! Request-time route resolution and the filter pipeline.

use crate::container::Container;
use crate::controller::{ControllerDispatcher, ControllerFactory};
use crate::error::{ServerError, ServerResult};
use crate::handler::{Filter, FilterOutcome, HandlerArgs, HandlerRegistry};
use crate::http::{Method, Reply, Request, Response};
use crate::router::{HandlerRef, RouteEntry, RouteTable};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// The outcome of resolving a method and path against the route table.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRoute<'t> {
    pub entry: &'t RouteEntry,
    /// The method the entry is registered under, after fallback.
    pub method: Method,
    /// Variables that captured a non-empty value, in declared order.
    pub variables: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    registry: Arc<HandlerRegistry>,
    container: Arc<Container>,
    controllers: ControllerDispatcher,
}

impl Dispatcher {
    pub fn new(
        table: Arc<RouteTable>,
        registry: Arc<HandlerRegistry>,
        container: Arc<Container>,
        factory: ControllerFactory,
    ) -> Self {
        let controllers = ControllerDispatcher::new(factory, Arc::clone(&container));
        Self {
            table,
            registry,
            container,
            controllers,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn dispatch(&self, request: &Request) -> ServerResult<Response> {
        let method = request.method();

        if let Some(hook) = self.table.before_all() {
            if hook.applies_to(method) {
                let callback = self.registry.get_hook(&hook.callback)?;
                if let FilterOutcome::Respond(reply) = callback.call(request, &self.container)? {
                    debug!(hook = %hook.callback, "before-all hook answered the request");
                    return self.controllers.prepare(request, reply);
                }
            }
        }

        let matched = self.resolve(method, request.normalized_path())?;
        let (before, after) = self.split_filters(matched.entry)?;

        // After-filters see the response whichever step produced it.
        let mut response = match run_filters(&before, request, None)? {
            Some(reply) => self.controllers.prepare(request, reply)?,
            None => self.invoke(request, &matched)?,
        };

        if let Some(reply) = run_filters(&after, request, Some(&response))? {
            response = self.controllers.prepare(request, reply)?;
        }
        Ok(response)
    }

    /// Finds the entry for `method` on `path` (already trimmed of slashes).
    ///
    /// Static routes are authoritative for their path: when one exists,
    /// variable routes are not consulted even if the method is missing.
    pub fn resolve(&self, method: Method, path: &str) -> ServerResult<MatchedRoute<'_>> {
        if let Some(routes) = self.table.static_routes().get(path) {
            let (method, entry) = select_method(routes, method, path)?;
            debug!(path, %method, "static route matched");
            return Ok(MatchedRoute {
                entry,
                method,
                variables: Vec::new(),
            });
        }

        for (index, group) in self.table.variable_routes().iter().enumerate() {
            let Some((route, variables)) = group.match_path(path) else {
                continue;
            };
            let (method, entry) = select_method(&route.methods, method, path)?;
            debug!(path, %method, group = index, pattern = %route.regex, "variable route matched");
            return Ok(MatchedRoute {
                entry,
                method,
                variables,
            });
        }

        debug!(path, "no route matched");
        Err(ServerError::RouteNotFound {
            path: path.to_string(),
        })
    }

    /// Resolves the entry's filter names against the table's filter registry.
    /// Filters run in the order the registry declares them; names the
    /// registry does not know are dropped.
    fn split_filters(&self, entry: &RouteEntry) -> ServerResult<(Vec<Arc<dyn Filter>>, Vec<Arc<dyn Filter>>)> {
        let lookup = |names: &[String]| -> ServerResult<Vec<Arc<dyn Filter>>> {
            self.table
                .filters()
                .iter()
                .filter(|binding| names.contains(&binding.name))
                .map(|binding| self.registry.get_filter(&binding.callback))
                .collect()
        };
        Ok((lookup(&entry.filters.before)?, lookup(&entry.filters.after)?))
    }

    fn invoke(&self, request: &Request, matched: &MatchedRoute<'_>) -> ServerResult<Response> {
        match &matched.entry.handler {
            HandlerRef::Closure { name } => {
                let handler = self.registry.get_handler(name)?;
                let args = if matched.variables.is_empty() {
                    HandlerArgs::App(&self.container)
                } else {
                    HandlerArgs::Vars(matched.variables.iter().map(|(_, value)| value.clone()).collect())
                };
                let reply = handler.invoke(args)?;
                self.controllers.prepare(request, reply)
            }
            HandlerRef::Controller { controller, method } => {
                self.controllers
                    .dispatch(request, controller, method, &matched.variables)
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.table.route_count())
            .field("registry", &self.registry)
            .field("controllers", &self.controllers)
            .finish()
    }
}

/// Exact method first, then `ANY`, then `GET` for a `HEAD` request.
fn select_method<'t>(
    routes: &'t BTreeMap<Method, RouteEntry>,
    method: Method,
    path: &str,
) -> ServerResult<(Method, &'t RouteEntry)> {
    let mut candidates = vec![method, Method::ANY];
    if method == Method::HEAD {
        candidates.push(Method::GET);
    }

    candidates
        .into_iter()
        .find_map(|candidate| routes.get(&candidate).map(|entry| (candidate, entry)))
        .ok_or_else(|| ServerError::MethodNotAllowed {
            path: path.to_string(),
            allowed: routes.keys().copied().collect(),
        })
}

/// Runs `filters` in order; the first one that responds ends the chain.
fn run_filters(
    filters: &[Arc<dyn Filter>],
    request: &Request,
    response: Option<&Response>,
) -> ServerResult<Option<Reply>> {
    for (position, filter) in filters.iter().enumerate() {
        if let FilterOutcome::Respond(reply) = filter.apply(request, response)? {
            trace!(position, after = response.is_some(), "filter short-circuited");
            return Ok(Some(reply));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{FilterSpec, RouteCollector};

    fn dispatcher(collector: RouteCollector, registry: HandlerRegistry) -> Dispatcher {
        Dispatcher::new(
            Arc::new(collector.into_table().unwrap()),
            Arc::new(registry),
            Arc::new(Container::new()),
            ControllerFactory::default(),
        )
    }

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .handler("list", |_| Ok("list"))
            .handler("show", |args| Ok(format!("show {}", args.vars().join("/"))))
            .handler("any", |_| Ok("any"));
        registry
    }

    #[test]
    fn head_falls_back_to_get_and_post_is_rejected() {
        let mut routes = RouteCollector::new();
        routes.get("/users", "list");
        let dispatcher = dispatcher(routes, registry());

        let matched = dispatcher.resolve(Method::HEAD, "users").unwrap();
        assert_eq!(matched.method, Method::GET);

        match dispatcher.resolve(Method::POST, "users") {
            Err(ServerError::MethodNotAllowed { allowed, .. }) => assert_eq!(allowed, vec![Method::GET]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn any_is_preferred_over_head_to_get() {
        let mut routes = RouteCollector::new();
        routes.get("/page", "list").any("/page", "any");
        let dispatcher = dispatcher(routes, registry());

        assert_eq!(dispatcher.resolve(Method::HEAD, "page").unwrap().method, Method::ANY);
        assert_eq!(dispatcher.resolve(Method::GET, "page").unwrap().method, Method::GET);
        assert_eq!(dispatcher.resolve(Method::DELETE, "page").unwrap().method, Method::ANY);
    }

    #[test]
    fn static_path_shadows_variable_routes() {
        let mut routes = RouteCollector::new();
        routes.get("/users", "list").post("/{section}", "show");
        let dispatcher = dispatcher(routes, registry());

        assert!(matches!(
            dispatcher.resolve(Method::POST, "users"),
            Err(ServerError::MethodNotAllowed { .. })
        ));
        assert!(dispatcher.resolve(Method::POST, "posts").is_ok());
    }

    #[test]
    fn unknown_path_is_not_found() {
        let dispatcher = dispatcher(RouteCollector::new(), registry());
        assert!(matches!(
            dispatcher.resolve(Method::GET, "nowhere"),
            Err(ServerError::RouteNotFound { path }) if path == "nowhere"
        ));
    }

    #[test]
    fn filters_follow_registry_order_and_skip_undeclared_names() {
        let mut routes = RouteCollector::new();
        routes
            .filter("first", "first")
            .filter("second", "second")
            .route(
                &[Method::GET],
                "/guarded",
                "list",
                FilterSpec::new().before("second").before("undeclared").before("first"),
            );
        let mut registry = registry();
        registry
            .filter("first", |_, _| Ok(FilterOutcome::respond("first")))
            .filter("second", |_, _| Ok(FilterOutcome::respond("second")));
        let dispatcher = dispatcher(routes, registry);

        let response = dispatcher
            .dispatch(&Request::new(Method::GET, "/guarded"))
            .unwrap();
        assert_eq!(response.body, "first");
    }

    #[test]
    fn declared_filter_without_callback_is_an_error() {
        let mut routes = RouteCollector::new();
        routes.filter("auth", "auth").route(
            &[Method::GET],
            "/secret",
            "list",
            FilterSpec::new().before("auth"),
        );
        let dispatcher = dispatcher(routes, registry());
        assert!(matches!(
            dispatcher.dispatch(&Request::new(Method::GET, "/secret")),
            Err(ServerError::UnknownFilter(name)) if name == "auth"
        ));
    }

    #[test]
    fn before_all_hook_applies_by_method() {
        let mut routes = RouteCollector::new();
        routes.get("/form", "list").post("/form", "list").before_all(&["post"], "csrf");
        let mut registry = registry();
        registry.hook("csrf", |request: &Request, _: &Container| {
            Ok(match request.header("x-csrf") {
                Some(_) => FilterOutcome::Continue,
                None => FilterOutcome::respond(Response::new(419)),
            })
        });
        let dispatcher = dispatcher(routes, registry);

        let blocked = dispatcher.dispatch(&Request::new(Method::POST, "/form")).unwrap();
        assert_eq!(blocked.status, 419);
        let allowed = dispatcher
            .dispatch(&Request::new(Method::POST, "/form").with_header("X-CSRF", "1"))
            .unwrap();
        assert_eq!(allowed.body, "list");
        let untouched = dispatcher.dispatch(&Request::new(Method::GET, "/form")).unwrap();
        assert_eq!(untouched.status, 200);
    }

    #[test]
    fn hook_runs_even_for_unknown_paths() {
        let mut routes = RouteCollector::new();
        routes.before_all(&["GET"], "maintenance");
        let mut registry = registry();
        registry.hook("maintenance", |_: &Request, _: &Container| {
            Ok(FilterOutcome::respond(Response::new(503)))
        });
        let dispatcher = dispatcher(routes, registry);
        let response = dispatcher.dispatch(&Request::new(Method::GET, "/missing")).unwrap();
        assert_eq!(response.status, 503);
    }
}
