use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::debug;

use super::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::config::HttpConfig;
use crate::{RiaError, RiaResult};

/// Blocking reqwest client. Redirects are never followed here; the session
/// decides which ones to chase.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> RiaResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .context("building http client")?;
        Ok(ReqwestTransport { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&mut self, request: &HttpRequest) -> RiaResult<HttpResponse> {
        debug!(method = ?request.method, url = %request.url, "sending request");
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().map_err(|e| RiaError::Http(format!("{}: {e}", request.url)))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response
            .bytes()
            .map_err(|e| RiaError::Http(format!("{}: reading body: {e}", request.url)))?
            .to_vec();
        Ok(HttpResponse { status, headers, body })
    }
}
