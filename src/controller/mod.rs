//! Controller dispatch.
//!
//! A route handler of the form `"UserController@show"` names a controller
//! type and one of its actions. The controller is looked up in the
//! [`Container`] under its namespace-qualified name, bound to the request and
//! driven through its lifecycle hooks before the action runs.

use crate::container::Container;
use crate::error::{ServerError, ServerResult};
use crate::http::{Reply, Request, Response, ResponseFactory};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_NAMESPACE: &str = "app::http::controllers";

/// A request-scoped controller. A fresh instance is built for every dispatch.
pub trait Controller: Send + 'static {
    fn set_request(&mut self, _request: Request) {}

    /// Runs once the request is bound, before any other hook.
    fn startup(&mut self) {}

    /// Returning a reply skips the action entirely.
    fn before_action(&mut self) -> Option<Reply> {
        None
    }

    fn before_render(&mut self) {}

    /// Runs `action`. Unknown actions should return [`ServerError::unknown_action`].
    fn call(&mut self, action: &str, params: &Params<'_>) -> ServerResult<Reply>;
}

/// Route variables and container services available to a controller action.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    vars: &'a [(String, String)],
    container: &'a Container,
}

impl<'a> Params<'a> {
    pub fn new(vars: &'a [(String, String)], container: &'a Container) -> Self {
        Self { vars, container }
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.vars
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, name: &str) -> ServerResult<&'a str> {
        self.get(name)
            .ok_or_else(|| ServerError::BadRequest(format!("missing route parameter `{name}`")))
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> ServerResult<T> {
        let raw = self.require(name)?;
        raw.parse()
            .map_err(|_| ServerError::BadRequest(format!("invalid value `{raw}` for `{name}`")))
    }

    pub fn service<T: 'static>(&self) -> ServerResult<&'a T> {
        self.container.get::<T>().ok_or_else(|| {
            ServerError::InternalError(format!(
                "service `{}` is not registered",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Present variables, in declared order.
    pub fn vars(&self) -> &'a [(String, String)] {
        self.vars
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }
}

/// Maps short controller names to namespace-qualified ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerFactory {
    namespace: String,
}

impl Default for ControllerFactory {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl ControllerFactory {
    pub fn new(namespace: &str) -> Self {
        let mut factory = Self {
            namespace: String::new(),
        };
        factory.set_namespace(namespace);
        factory
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: &str) -> &mut Self {
        let namespace = namespace.trim_end_matches(':');
        self.namespace = if namespace.is_empty() {
            String::new()
        } else {
            format!("{namespace}::")
        };
        self
    }

    /// `append_namespace("admin")` turns `app::http::controllers::` into
    /// `app::http::controllers::admin::`.
    pub fn append_namespace(&mut self, segment: &str) -> &mut Self {
        let segment = segment.trim_matches(':');
        if !segment.is_empty() {
            self.namespace.push_str(segment);
            self.namespace.push_str("::");
        }
        self
    }

    /// A leading `::` marks an already qualified name.
    pub fn name(&self, controller: &str) -> String {
        match controller.strip_prefix("::") {
            Some(qualified) => qualified.to_string(),
            None => format!("{}{}", self.namespace, controller),
        }
    }

    pub fn make(&self, container: &Container, controller: &str) -> ServerResult<Box<dyn Controller>> {
        container.make_controller(&self.name(controller))
    }
}

/// Runs controller actions and normalizes what they return.
#[derive(Debug, Clone)]
pub struct ControllerDispatcher {
    factory: ControllerFactory,
    container: Arc<Container>,
    responses: ResponseFactory,
}

impl ControllerDispatcher {
    pub fn new(factory: ControllerFactory, container: Arc<Container>) -> Self {
        Self {
            factory,
            container,
            responses: ResponseFactory::new(),
        }
    }

    pub fn factory(&self) -> &ControllerFactory {
        &self.factory
    }

    pub fn dispatch(
        &self,
        request: &Request,
        controller: &str,
        action: &str,
        vars: &[(String, String)],
    ) -> ServerResult<Response> {
        let mut instance = self.factory.make(&self.container, controller)?;
        instance.set_request(request.clone());
        instance.startup();

        if let Some(reply) = instance.before_action() {
            debug!(controller, action, "controller short-circuited before action");
            return self.prepare(request, reply);
        }

        instance.before_render();
        let params = Params::new(vars, &self.container);
        let reply = instance.call(action, &params)?;
        self.prepare(request, reply)
    }

    /// Wraps a non-response reply with status 200 and finalizes headers for `request`.
    pub fn prepare(&self, request: &Request, reply: Reply) -> ServerResult<Response> {
        let mut response = self.responses.normalize(reply)?;
        response.prepare(request);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, RedirectResponse};
    use serde_json::json;

    struct Greeter {
        prefix: String,
    }

    #[derive(Default)]
    struct Gate {
        request: Option<Request>,
        started: bool,
    }

    impl Controller for Gate {
        fn set_request(&mut self, request: Request) {
            self.request = Some(request);
        }

        fn startup(&mut self) {
            self.started = true;
        }

        fn before_action(&mut self) -> Option<Reply> {
            let request = self.request.as_ref()?;
            if self.started && request.header("x-token").is_none() {
                return Some(RedirectResponse::new("/login", 302).into());
            }
            None
        }

        fn call(&mut self, action: &str, params: &Params<'_>) -> ServerResult<Reply> {
            match action {
                "show" => {
                    let id: u32 = params.parse("id")?;
                    let greeter = params.service::<Greeter>()?;
                    Ok(json!({ "greeting": format!("{} {}", greeter.prefix, id) }).into())
                }
                "raw" => Ok(Response::text("raw").into()),
                other => Err(ServerError::unknown_action("Gate", other)),
            }
        }
    }

    fn dispatcher() -> ControllerDispatcher {
        let mut container = Container::new();
        container.insert(Greeter {
            prefix: "hello".into(),
        });
        container.bind_controller("app::http::controllers::Gate", || Box::new(Gate::default()));
        ControllerDispatcher::new(ControllerFactory::default(), Arc::new(container))
    }

    fn vars(id: &str) -> Vec<(String, String)> {
        vec![("id".to_string(), id.to_string())]
    }

    #[test]
    fn namespace_handling() {
        let mut factory = ControllerFactory::new("app::http::controllers::");
        assert_eq!(factory.name("UserController"), "app::http::controllers::UserController");
        factory.append_namespace("admin");
        assert_eq!(factory.name("Users"), "app::http::controllers::admin::Users");
        factory.set_namespace("");
        assert_eq!(factory.name("Users"), "Users");
        assert_eq!(factory.name("::other::Thing"), "other::Thing");
    }

    #[test]
    fn action_reply_is_wrapped_and_prepared() {
        let request = Request::new(Method::GET, "/gate/7").with_header("X-Token", "t");
        let response = dispatcher().dispatch(&request, "Gate", "show", &vars("7")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header_value("Content-Type"), Some("application/json"));
        assert!(response.body.contains("hello 7"));
        assert!(response.has_header("Content-Length"));
    }

    #[test]
    fn before_action_short_circuits() {
        let request = Request::new(Method::GET, "/gate/7");
        let response = dispatcher().dispatch(&request, "Gate", "show", &vars("7")).unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.header_value("Location"), Some("/login"));
    }

    #[test]
    fn errors_propagate() {
        let request = Request::new(Method::GET, "/gate/x").with_header("X-Token", "t");
        let dispatcher = dispatcher();
        assert!(matches!(
            dispatcher.dispatch(&request, "Gate", "show", &vars("x")),
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            dispatcher.dispatch(&request, "Gate", "missing", &[]),
            Err(ServerError::UnknownAction { .. })
        ));
        assert!(matches!(
            dispatcher.dispatch(&request, "Nope", "show", &[]),
            Err(ServerError::UnknownController(_))
        ));
    }

    #[test]
    fn head_requests_get_an_empty_body() {
        let request = Request::new(Method::HEAD, "/gate").with_header("X-Token", "t");
        let response = dispatcher().dispatch(&request, "Gate", "raw", &[]).unwrap();
        assert_eq!(response.body, "");
        assert_eq!(response.header_value("Content-Length"), Some("3"));
    }
}
