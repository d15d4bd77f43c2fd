pub(crate) mod request;
pub(crate) mod response;

pub use request::{Method, Request};
pub use response::{RedirectResponse, Reply, Response, ResponseFactory};
