//! # Switchyard
//!
//! HTTP route resolution and dispatch.
//!
//! Routes are declared in TOML route files (or registered on a
//! [`RouteCollector`](router::RouteCollector)) and compiled into a serializable
//! [`RouteTable`](router::RouteTable): exact-match static routes plus
//! regex-grouped variable routes. A [`Dispatcher`](dispatcher::Dispatcher)
//! resolves each request against the table, runs the route's before/after
//! filters and invokes either a named closure or a controller action.
//!
//! The route table can be cached on disk; see [`cache`].
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard::app::Application;
//! use switchyard::handler::FilterOutcome;
//! use switchyard::http::{Method, Request, Response};
//! use switchyard::router::{FilterSpec, RouteCollector};
//!
//! let mut app = Application::default();
//! app.handler("users.show", |args| Ok(switchyard::json!({ "id": args.var(0) })))
//!     .filter("auth", |request, _| {
//!         Ok(match request.header("authorization") {
//!             Some(_) => FilterOutcome::Continue,
//!             None => FilterOutcome::respond(Response::new(401)),
//!         })
//!     });
//!
//! let mut routes = RouteCollector::new();
//! routes
//!     .filter("auth", "auth")
//!     .route(&[Method::GET], "/users/{id:i}", "users.show", FilterSpec::new().before("auth"));
//! app.boot_with(routes.into_table().unwrap());
//!
//! let denied = app.handle(&Request::new(Method::GET, "/users/7"));
//! assert_eq!(denied.status, 401);
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod container;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod router;
pub extern crate serde_json;

// Reexport serde_json
pub use serde_json::{json, Value};
