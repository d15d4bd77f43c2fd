use crate::error::ServerError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// HTTP request methods, plus the `ANY` wildcard used only when registering routes.
#[derive(Eq, Hash, PartialEq, PartialOrd, Ord, Copy, Clone, Debug, Serialize)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
    ANY,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
            Method::ANY => "ANY",
        }
    }
}

impl FromStr for Method {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            "ANY" => Ok(Method::ANY),
            other => Err(ServerError::BadRequest(format!("unsupported method `{other}`"))),
        }
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming request as seen by the dispatcher.
///
/// `path` is the raw path info (no query string); matching uses
/// [`Request::normalized_path`], which trims surrounding slashes.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

impl Request {
    /// Builds a request from a method and a request target such as `/users/42?page=2`.
    pub fn new(method: Method, target: &str) -> Request {
        let mut parts = target.splitn(2, '?');
        let path = parts.next().unwrap_or("/");
        let path = if path.is_empty() { "/" } else { path };
        let query = parts.next().map(Self::parse_query).unwrap_or_default();

        Request {
            method,
            path: path.to_string(),
            query,
            headers: HashMap::new(),
        }
    }

    /// Parses a request line pair such as `("post", "/users")`. `ANY` only
    /// names a route registration and is refused as a request method.
    pub fn parse(method: &str, target: &str) -> Result<Request, ServerError> {
        match method.parse()? {
            Method::ANY => Err(ServerError::BadRequest(format!(
                "`{method}` is not a request method"
            ))),
            method => Ok(Request::new(method, target)),
        }
    }

    pub fn with_header<K: AsRef<str>, V: AsRef<str>>(mut self, name: K, value: V) -> Self {
        self.headers
            .insert(name.as_ref().to_lowercase(), value.as_ref().to_string());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path_info(&self) -> &str {
        &self.path
    }

    pub fn normalized_path(&self) -> &str {
        self.path.trim_matches('/')
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn parse_query(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next().unwrap_or("");
                Some((Self::decode(key), Self::decode(value)))
            })
            .collect()
    }

    fn decode(raw: &str) -> String {
        let raw = raw.replace('+', " ");
        urlencoding::decode(&raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_decodes_query() {
        let req = Request::new(Method::GET, "/search/?q=hello+world&tag=r%26d&flag");
        assert_eq!(req.path_info(), "/search/");
        assert_eq!(req.normalized_path(), "search");
        assert_eq!(req.query("q"), Some("hello world"));
        assert_eq!(req.query("tag"), Some("r&d"));
        assert_eq!(req.query("flag"), Some(""));
    }

    #[test]
    fn root_path_normalizes_to_empty() {
        let req = Request::new(Method::GET, "");
        assert_eq!(req.path_info(), "/");
        assert_eq!(req.normalized_path(), "");
    }

    #[test]
    fn method_parsing_is_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::GET);
        assert_eq!("Patch".parse::<Method>().unwrap(), Method::PATCH);
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn wildcard_is_not_a_request_method() {
        assert!(matches!(Request::parse("ANY", "/"), Err(ServerError::BadRequest(_))));
        assert!(matches!(Request::parse("any", "/"), Err(ServerError::BadRequest(_))));
        assert_eq!(Request::parse("post", "/users").unwrap().method(), Method::POST);
    }

    #[test]
    fn methods_deserialize_in_any_case() {
        let methods: Vec<Method> = serde_json::from_str(r#"["get", "Post", "ANY"]"#).unwrap();
        assert_eq!(methods, vec![Method::GET, Method::POST, Method::ANY]);
        assert!(serde_json::from_str::<Method>(r#""brew""#).is_err());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = Request::new(Method::GET, "/").with_header("X-Token", "abc");
        assert_eq!(req.header("x-token"), Some("abc"));
        assert_eq!(req.header("X-TOKEN"), Some("abc"));
    }
}
