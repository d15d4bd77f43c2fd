use crate::error::{ServerError, ServerResult};
use crate::http::{Method, Request};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::SystemTime;

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    // Chainable status setter
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    pub fn body<T: AsRef<str>>(&mut self, body: T) -> &mut Self {
        self.body = body.as_ref().to_string();
        self
    }

    /// Sets a header, replacing any existing header of the same name regardless of case.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        self.remove_header(name.as_ref());
        self.headers
            .insert(name.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    pub fn headers(&mut self, headers: HashMap<String, String>) -> &mut Self {
        for (name, value) in headers {
            self.header(name, value);
        }
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header_value(name).is_some()
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ServerError> {
        let json_string = serde_json::to_string(value)
            .map_err(|e| ServerError::InternalError(format!("JSON serialization error: {}", e)))?;
        self.header("Content-Type", "application/json");
        self.body(json_string);
        Ok(self)
    }

    pub fn no_content() -> Response {
        Response::new(204)
    }

    pub fn text<T: AsRef<str>>(content: T) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "text/plain")
            .body(content);
        response
    }

    /// Default rendering of a dispatch error: a JSON body carrying the message and
    /// status, plus an `Allow` header for 405s.
    pub fn error(err: &ServerError) -> Response {
        let status = err.status_code();
        let mut response = Response::new(status);
        let payload = serde_json::json!({
            "error": {
                "message": err.to_string(),
                "status": status
            }
        });
        response
            .header("Content-Type", "application/json")
            .body(payload.to_string());
        if let Some(allowed) = err.allowed_methods() {
            let allowed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
            response.header("Allow", allowed.join(", "));
        }
        response
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    pub fn is_empty(&self) -> bool {
        self.status == 204 || self.status == 304
    }

    /// Finalizes headers against the request before the response leaves the core.
    pub fn prepare(&mut self, request: &Request) -> &mut Self {
        if self.is_informational() || self.is_empty() {
            self.body.clear();
            self.remove_header("Content-Type");
            self.remove_header("Content-Length");
        } else {
            if !self.has_header("Content-Type") {
                self.header("Content-Type", DEFAULT_CONTENT_TYPE);
            }
            let head = request.method() == Method::HEAD;
            if self.has_header("Transfer-Encoding") {
                self.remove_header("Content-Length");
            } else if !(head && self.body.is_empty() && self.has_header("Content-Length")) {
                // A HEAD response prepared earlier keeps the length of the body it dropped.
                let length = self.body.len().to_string();
                self.header("Content-Length", length);
            }
            if head {
                self.body.clear();
            }
        }

        if !self.has_header("Date") {
            self.header("Date", httpdate::fmt_http_date(SystemTime::now()));
        }
        self
    }
}

/// A redirect, kept distinct from [`Response`] until it is prepared.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectResponse {
    pub target_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl RedirectResponse {
    pub fn new<T: Into<String>>(target_url: T, status: u16) -> Self {
        Self {
            target_url: target_url.into(),
            status,
            headers: HashMap::new(),
        }
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn into_response(self) -> Response {
        let escaped = self
            .target_url
            .replace('&', "&amp;")
            .replace('"', "&quot;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let mut response = Response::new(self.status);
        response
            .headers(self.headers)
            .header("Location", &self.target_url)
            .header("Content-Type", DEFAULT_CONTENT_TYPE)
            .body(format!(
                "<!DOCTYPE html>\n<html>\n    <head>\n        <meta charset=\"UTF-8\" />\n        \
                 <meta http-equiv=\"refresh\" content=\"0;url='{escaped}'\" />\n        \
                 <title>Redirecting to {escaped}</title>\n    </head>\n    <body>\n        \
                 Redirecting to <a href=\"{escaped}\">{escaped}</a>.\n    </body>\n</html>"
            ));
        response
    }
}

/// Anything a handler, filter or controller action may hand back.
///
/// `Response` and `Redirect` are already response-shaped; the remaining variants
/// are wrapped by [`ResponseFactory`] into a `200` response.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Response(Response),
    Redirect(RedirectResponse),
    Text(String),
    Json(Value),
    Empty,
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<RedirectResponse> for Reply {
    fn from(redirect: RedirectResponse) -> Self {
        Reply::Redirect(redirect)
    }
}

impl From<String> for Reply {
    fn from(content: String) -> Self {
        Reply::Text(content)
    }
}

impl From<&str> for Reply {
    fn from(content: &str) -> Self {
        Reply::Text(content.to_string())
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseFactory;

impl ResponseFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn make<T: AsRef<str>>(
        &self,
        content: T,
        status: u16,
        headers: HashMap<String, String>,
    ) -> Response {
        let mut response = Response::new(status);
        response.headers(headers).body(content);
        response
    }

    pub fn json(
        &self,
        data: &Value,
        status: u16,
        headers: HashMap<String, String>,
    ) -> ServerResult<Response> {
        let mut response = Response::new(status);
        response.headers(headers).json(data)?;
        Ok(response)
    }

    pub fn redirect_to<T: Into<String>>(&self, path: T, status: u16) -> RedirectResponse {
        RedirectResponse::new(path, status)
    }

    /// Turns any reply into a response; non-response replies become status 200 with no extra headers.
    pub fn normalize(&self, reply: Reply) -> ServerResult<Response> {
        match reply {
            Reply::Response(response) => Ok(response),
            Reply::Redirect(redirect) => Ok(redirect.into_response()),
            Reply::Text(content) => Ok(self.make(content, 200, HashMap::new())),
            Reply::Json(value) => self.json(&value, 200, HashMap::new()),
            Reply::Empty => Ok(self.make("", 200, HashMap::new())),
        }
    }
}
