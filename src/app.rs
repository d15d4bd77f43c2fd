//! The composition root.
//!
//! `Application` collects everything a route table refers to by name (closure
//! handlers, filter callbacks, before-all hooks, controllers) together with
//! the services handlers may ask for, then boots a [`Dispatcher`] over a route
//! table and renders dispatch failures into responses.
//!
//! # Examples
//!
//! ```rust
//! use switchyard::app::Application;
//! use switchyard::http::{Method, Request};
//! use switchyard::router::RouteCollector;
//!
//! let mut app = Application::default();
//! app.handler("hello", |args| Ok(format!("hello {}", args.var(0).unwrap_or("world"))));
//!
//! let mut routes = RouteCollector::new();
//! routes.get("/hello/{name?}", "hello");
//! app.boot_with(routes.into_table().unwrap());
//!
//! let response = app.handle(&Request::new(Method::GET, "/hello/ada"));
//! assert_eq!(response.body, "hello ada");
//! ```

use crate::config::RoutingConfig;
use crate::container::Container;
use crate::controller::{Controller, ControllerFactory};
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::handler::{FilterOutcome, HandlerArgs, HandlerRegistry};
use crate::http::{Reply, Request, Response};
use crate::logging;
use crate::router::{RouteTable, RouteTableProvider};
use std::sync::Arc;
use tracing::{debug, error, info};

type ErrorHandler = Arc<dyn Fn(ServerError) -> Response + Send + Sync>;

#[derive(Clone)]
pub struct Application {
    config: RoutingConfig,
    container: Container,
    registry: HandlerRegistry,
    factory: ControllerFactory,
    on_error: Option<ErrorHandler>,
    dispatcher: Option<Dispatcher>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

impl Application {
    pub fn new(config: RoutingConfig) -> Self {
        let factory = ControllerFactory::new(&config.controller_namespace);
        Self {
            config,
            container: Container::new(),
            registry: HandlerRegistry::new(),
            factory,
            on_error: None,
            dispatcher: None,
        }
    }

    pub fn from_config_file(path: &std::path::Path) -> ServerResult<Self> {
        Ok(Self::new(RoutingConfig::from_file(path)?))
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Installs the tracing subscriber described by the `[logging]` section.
    pub fn init_logging(&self) -> ServerResult<()> {
        logging::init_logging(&self.config.logging)
    }

    pub fn handler<F, R>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(HandlerArgs<'a>) -> ServerResult<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.registry.handler(name, handler);
        self
    }

    pub fn filter<F>(&mut self, name: &str, filter: F) -> &mut Self
    where
        F: Fn(&Request, Option<&Response>) -> ServerResult<FilterOutcome> + Send + Sync + 'static,
    {
        self.registry.filter(name, filter);
        self
    }

    pub fn hook<F>(&mut self, name: &str, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Container) -> ServerResult<FilterOutcome> + Send + Sync + 'static,
    {
        self.registry.hook(name, hook);
        self
    }

    /// Binds a controller under `name` within the configured namespace.
    pub fn controller<C, F>(&mut self, name: &str, make: F) -> &mut Self
    where
        C: Controller,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let qualified = self.factory.name(name);
        debug!(controller = %qualified, "controller bound");
        self.container
            .bind_controller(qualified, move || Box::new(make()) as Box<dyn Controller>);
        self
    }

    pub fn service<T>(&mut self, service: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.container.insert(service);
        self
    }

    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ServerError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Loads the route table from the configured route files (and cache) and
    /// builds the dispatcher. Registrations made afterwards need another boot.
    pub fn boot(&mut self) -> ServerResult<&Dispatcher> {
        let table = RouteTableProvider::new(self.config.clone()).load()?;
        Ok(self.boot_with(table))
    }

    pub fn boot_with(&mut self, table: RouteTable) -> &Dispatcher {
        info!(
            routes = table.route_count(),
            groups = table.variable_routes().len(),
            "dispatcher ready"
        );
        self.dispatcher.insert(Dispatcher::new(
            Arc::new(table),
            Arc::new(self.registry.clone()),
            Arc::new(self.container.clone()),
            self.factory.clone(),
        ))
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Dispatches `request`, rendering any failure as a response.
    pub fn handle(&self, request: &Request) -> Response {
        let result = match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(request),
            None => Err(ServerError::InternalError(
                "application has not been booted".to_string(),
            )),
        };

        match result {
            Ok(response) => response,
            Err(err) => self.handle_error(request, err),
        }
    }

    fn handle_error(&self, request: &Request, err: ServerError) -> Response {
        if err.status_code() >= 500 {
            error!(method = %request.method(), path = request.path_info(), error = %err, "dispatch failed");
        } else {
            debug!(method = %request.method(), path = request.path_info(), error = %err, "dispatch rejected");
        }

        let mut response = match &self.on_error {
            Some(handler) => handler(err),
            None => Response::error(&err),
        };
        response.prepare(request);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::router::RouteCollector;

    fn booted() -> Application {
        let mut app = Application::default();
        app.handler("home", |_| Ok("home"));
        let mut routes = RouteCollector::new();
        routes.get("/", "home").get("/broken", "missing");
        app.boot_with(routes.into_table().unwrap());
        app
    }

    #[test]
    fn errors_are_rendered_with_status_and_allow_header() {
        let app = booted();
        let not_allowed = app.handle(&Request::new(Method::PUT, "/"));
        assert_eq!(not_allowed.status, 405);
        assert_eq!(not_allowed.header_value("Allow"), Some("GET"));

        let missing = app.handle(&Request::new(Method::GET, "/nope"));
        assert_eq!(missing.status, 404);
        assert!(missing.body.contains("Route nope does not exist"));

        let broken = app.handle(&Request::new(Method::GET, "/broken"));
        assert_eq!(broken.status, 500);
    }

    #[test]
    fn custom_error_renderer_is_used() {
        let mut app = booted();
        app.on_error(|err| {
            let mut response = Response::text(format!("oops: {}", err.status_code()));
            response.status(err.status_code());
            response
        });
        let response = app.handle(&Request::new(Method::GET, "/nope"));
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "oops: 404");
    }

    #[test]
    fn unbooted_application_answers_500() {
        let app = Application::default();
        assert!(app.dispatcher().is_none());
        assert_eq!(app.handle(&Request::new(Method::GET, "/")).status, 500);
    }
}
