// Extracting a raw token from an inbound request

use std::collections::HashMap;
use std::fmt::Debug;

/// Read-only view of an inbound request.
///
/// Header names are matched case-insensitively by implementations.
pub trait RequestView: Send + Sync {
    fn header(&self, name: &str) -> Option<&str>;

    fn query(&self, name: &str) -> Option<&str>;

    fn cookie(&self, name: &str) -> Option<&str>;

    /// Matched route parameter, if the router exposes them.
    fn route_param(&self, _name: &str) -> Option<&str> {
        None
    }
}

impl<T: RequestView + ?Sized> RequestView for &T {
    fn header(&self, name: &str) -> Option<&str> {
        (**self).header(name)
    }

    fn query(&self, name: &str) -> Option<&str> {
        (**self).query(name)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        (**self).cookie(name)
    }

    fn route_param(&self, name: &str) -> Option<&str> {
        (**self).route_param(name)
    }
}

/// Minimal owned request, enough for tests and for adapting other HTTP
/// types.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a header. A `Cookie` header is also split into cookies.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        if name == "cookie" {
            for pair in value.split(';') {
                if let Some((k, v)) = pair.split_once('=') {
                    self.cookies.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }
        self.headers.insert(name, value);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }
}

impl RequestView for HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn route_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }
}

/// One way of finding a token in a request.
pub trait TokenParser: Send + Sync + Debug {
    fn parse(&self, request: &dyn RequestView) -> Option<String>;
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `Authorization: Bearer <token>` (header name and prefix configurable).
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    header: String,
    prefix: String,
}

impl AuthHeaders {
    pub fn new(header: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            prefix: prefix.into(),
        }
    }
}

impl Default for AuthHeaders {
    fn default() -> Self {
        Self::new("authorization", "bearer")
    }
}

impl TokenParser for AuthHeaders {
    fn parse(&self, request: &dyn RequestView) -> Option<String> {
        let value = request.header(&self.header)?.trim();
        let (scheme, rest) = value.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        // A header may carry several credentials, e.g. "Bearer x, Basic y".
        non_empty(rest.split(',').next().unwrap_or_default())
    }
}

/// `?token=<token>`
#[derive(Debug, Clone)]
pub struct QueryString {
    key: String,
}

impl QueryString {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for QueryString {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenParser for QueryString {
    fn parse(&self, request: &dyn RequestView) -> Option<String> {
        request.query(&self.key).and_then(non_empty)
    }
}

/// `Cookie: token=<token>`
#[derive(Debug, Clone)]
pub struct Cookies {
    key: String,
}

impl Cookies {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for Cookies {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenParser for Cookies {
    fn parse(&self, request: &dyn RequestView) -> Option<String> {
        request.cookie(&self.key).and_then(non_empty)
    }
}

/// `/route/{token}`
#[derive(Debug, Clone)]
pub struct RouteParams {
    key: String,
}

impl RouteParams {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for RouteParams {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenParser for RouteParams {
    fn parse(&self, request: &dyn RequestView) -> Option<String> {
        request.route_param(&self.key).and_then(non_empty)
    }
}

/// Ordered chain of [`TokenParser`]s; the first non-empty match wins.
#[derive(Debug)]
pub struct RequestParser {
    chain: Vec<Box<dyn TokenParser>>,
}

impl RequestParser {
    pub fn new(chain: Vec<Box<dyn TokenParser>>) -> Self {
        Self { chain }
    }

    /// Append a strategy at the lowest priority.
    pub fn with(mut self, parser: impl TokenParser + 'static) -> Self {
        self.chain.push(Box::new(parser));
        self
    }

    pub fn set_chain(&mut self, chain: Vec<Box<dyn TokenParser>>) {
        self.chain = chain;
    }

    pub fn chain(&self) -> &[Box<dyn TokenParser>] {
        &self.chain
    }

    pub fn parse_token(&self, request: &dyn RequestView) -> Option<String> {
        self.chain.iter().find_map(|parser| parser.parse(request))
    }

    pub fn has_token(&self, request: &dyn RequestView) -> bool {
        self.parse_token(request).is_some()
    }
}

impl Default for RequestParser {
    /// Header, then query string, then cookie, then route parameter.
    fn default() -> Self {
        Self::new(vec![
            Box::new(AuthHeaders::default()),
            Box::new(QueryString::default()),
            Box::new(Cookies::default()),
            Box::new(RouteParams::default()),
        ])
    }
}
