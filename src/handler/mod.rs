//! Invocable route targets.
//!
//! Route tables only carry string identifiers so they can be cached on disk;
//! the [`HandlerRegistry`] maps those identifiers back to typed callables at
//! dispatch time.

use crate::container::Container;
use crate::error::{ServerError, ServerResult};
use crate::http::{Reply, Request, Response};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a closure handler receives.
///
/// Extracted path variables are passed positionally in declared order. A route
/// without any present variables gets the application container instead.
pub enum HandlerArgs<'a> {
    Vars(Vec<String>),
    App(&'a Container),
}

impl<'a> HandlerArgs<'a> {
    pub fn var(&self, index: usize) -> Option<&str> {
        match self {
            HandlerArgs::Vars(vars) => vars.get(index).map(String::as_str),
            HandlerArgs::App(_) => None,
        }
    }

    pub fn vars(&self) -> &[String] {
        match self {
            HandlerArgs::Vars(vars) => vars,
            HandlerArgs::App(_) => &[],
        }
    }

    pub fn app(&self) -> Option<&'a Container> {
        match self {
            HandlerArgs::App(app) => Some(*app),
            HandlerArgs::Vars(_) => None,
        }
    }
}

/// Result of a filter or before-all hook.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Continue,
    Respond(Reply),
}

impl FilterOutcome {
    pub fn respond<R: Into<Reply>>(reply: R) -> Self {
        FilterOutcome::Respond(reply.into())
    }
}

pub trait Handler: Send + Sync + 'static {
    fn invoke(&self, args: HandlerArgs<'_>) -> ServerResult<Reply>;
}

impl<F, R> Handler for F
where
    F: for<'a> Fn(HandlerArgs<'a>) -> ServerResult<R> + Send + Sync + 'static,
    R: Into<Reply>,
{
    fn invoke(&self, args: HandlerArgs<'_>) -> ServerResult<Reply> {
        (self)(args).map(Into::into)
    }
}

/// A named before/after interceptor. `response` is `None` for before-filters.
pub trait Filter: Send + Sync + 'static {
    fn apply(&self, request: &Request, response: Option<&Response>) -> ServerResult<FilterOutcome>;
}

impl<F> Filter for F
where
    F: Fn(&Request, Option<&Response>) -> ServerResult<FilterOutcome> + Send + Sync + 'static,
{
    fn apply(&self, request: &Request, response: Option<&Response>) -> ServerResult<FilterOutcome> {
        (self)(request, response)
    }
}

/// The single global hook evaluated before any route matching.
pub trait BeforeAllHook: Send + Sync + 'static {
    fn call(&self, request: &Request, app: &Container) -> ServerResult<FilterOutcome>;
}

impl<F> BeforeAllHook for F
where
    F: Fn(&Request, &Container) -> ServerResult<FilterOutcome> + Send + Sync + 'static,
{
    fn call(&self, request: &Request, app: &Container) -> ServerResult<FilterOutcome> {
        (self)(request, app)
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    filters: HashMap<String, Arc<dyn Filter>>,
    hooks: HashMap<String, Arc<dyn BeforeAllHook>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<F, R>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: for<'a> Fn(HandlerArgs<'a>) -> ServerResult<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn filter<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(&Request, Option<&Response>) -> ServerResult<FilterOutcome> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn hook<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Container) -> ServerResult<FilterOutcome> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    pub fn get_handler(&self, name: &str) -> ServerResult<Arc<dyn Handler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownHandler(name.to_string()))
    }

    pub fn get_filter(&self, name: &str) -> ServerResult<Arc<dyn Filter>> {
        self.filters
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownFilter(name.to_string()))
    }

    pub fn get_hook(&self, name: &str) -> ServerResult<Arc<dyn BeforeAllHook>> {
        self.hooks
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownHook(name.to_string()))
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .field("filters", &self.filters.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn closures_are_registered_by_name() {
        let mut registry = HandlerRegistry::new();
        registry.handler("echo", |args| Ok(args.vars().join(",")));

        let handler = registry.get_handler("echo").unwrap();
        let reply = handler
            .invoke(HandlerArgs::Vars(vec!["a".into(), "b".into()]))
            .unwrap();
        assert_eq!(reply, Reply::Text("a,b".into()));
        assert!(matches!(
            registry.get_handler("missing"),
            Err(ServerError::UnknownHandler(_))
        ));
    }

    #[test]
    fn filters_see_the_current_response() {
        let mut registry = HandlerRegistry::new();
        registry.filter("tag", |_, response| {
            Ok(match response {
                Some(response) => FilterOutcome::respond(format!("seen {}", response.status)),
                None => FilterOutcome::Continue,
            })
        });

        let filter = registry.get_filter("tag").unwrap();
        let req = Request::new(Method::GET, "/");
        assert_eq!(filter.apply(&req, None).unwrap(), FilterOutcome::Continue);
        assert_eq!(
            filter.apply(&req, Some(&Response::new(201))).unwrap(),
            FilterOutcome::Respond(Reply::Text("seen 201".into()))
        );
    }
}
