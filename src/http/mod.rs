//! HTTP session used by the network builtins.
//!
//! # Architecture
//!
//! - **HttpTransport**: sends one request and returns the final response.
//!   `ReqwestTransport` is the production adapter; `CannedTransport` replays
//!   scripted responses for tests.
//! - **HttpSession**: per-engine state on top of a transport. It keeps the
//!   current site address for relative URLs, the headers set by scripts,
//!   cookies queued by `load_cookie` and the last response.

pub mod cookies;
pub mod transport;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{RiaError, RiaResult};

pub use transport::ReqwestTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        HttpResponse { status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Status line, headers and body as they would appear on the wire.
    pub fn dump(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {}\r\n", self.status).into_bytes();
        for (k, v) in &self.headers {
            out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

pub trait HttpTransport: Send {
    fn send(&mut self, request: &HttpRequest) -> RiaResult<HttpResponse>;
}

/// Builds a transport the first time a session needs one.
pub type TransportFactory = Arc<dyn Fn() -> RiaResult<Box<dyn HttpTransport>> + Send + Sync>;

/// Transport that replays queued responses and records every request.
#[derive(Clone, Default)]
pub struct CannedTransport {
    responses: Arc<Mutex<VecDeque<HttpResponse>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: HttpResponse) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
        self
    }

    /// Requests sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Factory handing out clones that share this transport's queues.
    pub fn factory(&self) -> TransportFactory {
        let shared = self.clone();
        Arc::new(move || Ok(Box::new(shared.clone()) as Box<dyn HttpTransport>))
    }
}

impl HttpTransport for CannedTransport {
    fn send(&mut self, request: &HttpRequest) -> RiaResult<HttpResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        self.responses
            .lock()
            .map_err(|_| RiaError::Http("canned transport poisoned".into()))?
            .pop_front()
            .ok_or_else(|| RiaError::Http(format!("no canned response for {}", request.url)))
    }
}

pub struct HttpSession {
    factory: TransportFactory,
    transport: Option<Box<dyn HttpTransport>>,
    site: Option<String>,
    headers: Vec<(String, String)>,
    pending_cookies: Vec<(String, String)>,
    last: Option<HttpResponse>,
    max_redirects: usize,
}

impl HttpSession {
    pub fn new(factory: TransportFactory) -> Self {
        HttpSession {
            factory,
            transport: None,
            site: None,
            headers: Vec::new(),
            pending_cookies: Vec::new(),
            last: None,
            max_redirects: 5,
        }
    }

    /// Limit on `301` hops followed by one request.
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Set a request header for the rest of the session. An empty value removes it.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        if !value.is_empty() {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Queue a cookie for the next request only.
    pub fn queue_cookie(&mut self, name: &str, value: &str) {
        self.pending_cookies.retain(|(k, _)| k != name);
        self.pending_cookies.push((name.to_string(), value.to_string()));
    }

    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.last.as_ref()
    }

    pub fn last_text(&self) -> String {
        self.last.as_ref().map(HttpResponse::text).unwrap_or_default()
    }

    /// Header of the last response; repeated headers are joined with `\n`.
    pub fn last_header(&self, name: &str) -> String {
        self.last
            .as_ref()
            .map(|r| r.header_values(name).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    /// Absolute form of `url`. A URL with a scheme also becomes the current site.
    pub fn resolve(&mut self, url: &str) -> RiaResult<String> {
        let lower = url.to_ascii_lowercase();
        if let Some(scheme_end) = ["http://", "https://"]
            .iter()
            .find(|s| lower.starts_with(*s))
            .map(|s| s.len())
        {
            let host_end = url[scheme_end..].find('/').map_or(url.len(), |i| scheme_end + i);
            self.site = Some(url[..host_end].to_string());
            return Ok(url.to_string());
        }
        let site = self
            .site
            .as_deref()
            .ok_or_else(|| RiaError::Http(format!("relative url '{url}' without a previous site")))?;
        if url.starts_with('/') {
            Ok(format!("{site}{url}"))
        } else {
            Ok(format!("{site}/{url}"))
        }
    }

    /// Send a request through the session and cache the response.
    ///
    /// Only `301 Moved Permanently` is followed, at most `max_redirects`
    /// times, with the same method and body. Other `3xx` answers come back
    /// to the script with their headers so `Set-Cookie` can be saved.
    pub fn request(&mut self, method: Method, url: &str, body: Option<&str>) -> RiaResult<&HttpResponse> {
        let mut url = self.resolve(url)?;
        let mut headers = self.headers.clone();
        if !self.pending_cookies.is_empty() {
            let cookie = self
                .pending_cookies
                .drain(..)
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("Cookie".to_string(), cookie));
        }
        if method == Method::Post && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string()));
        }
        let mut redirects = 0;
        loop {
            let request = HttpRequest { method, url, headers: headers.clone(), body: body.map(str::to_string) };
            let transport = match &mut self.transport {
                Some(t) => t,
                slot => slot.insert((self.factory)()?),
            };
            let response = transport.send(&request)?;
            debug!(url = %request.url, status = response.status, bytes = response.body.len(), "http response");
            let location = response.header_values("location").next().map(str::to_string);
            match location {
                Some(location) if response.status == 301 && redirects < self.max_redirects => {
                    redirects += 1;
                    url = self.resolve(&location)?;
                    debug!(%url, redirects, "following redirect");
                }
                _ => return Ok(self.last.insert(response)),
            }
        }
    }
}
