//! HTTP gateway to the archive
//!
//! This module owns everything about talking to the site:
//! - Building HTTP clients with the configured user agent and timeouts
//! - Passing every request through the shared [`RequestBudget`]
//! - Manual redirect handling (max 10 hops, loop detection)
//! - Translating HTTP 429 into [`Ao3Error::RateLimited`]

use crate::config::ClientConfig;
use crate::requester::RequestBudget;
use crate::session::Session;
use crate::state::Snapshot;
use crate::{Ao3Error, Result};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{redirect::Policy, Client, Method, StatusCode};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// Maximum redirect hops followed for a single request
pub const MAX_REDIRECTS: usize = 10;

/// A request to be sent through the gateway
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    form: Option<Vec<(String, String)>>,
    follow_redirects: bool,
}

impl ArchiveRequest {
    /// A GET request; redirects are followed
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            form: None,
            follow_redirects: true,
        }
    }

    /// A POST request; redirects are returned to the caller untouched
    pub fn post(url: Url) -> Self {
        Self {
            method: Method::POST,
            follow_redirects: false,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a url-encoded form body
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// URL of the last hop when redirects were followed
    pub url: Url,
    pub body: String,
}

impl RawResponse {
    /// The `Location` header, if present and valid UTF-8
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Parses the body as JSON, returning `None` for any other payload
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Wraps the body in a fresh snapshot
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(self.body)
    }
}

/// Builds an HTTP client for the archive
///
/// # Arguments
///
/// * `config` - The client configuration
/// * `cookies` - Whether the client keeps a cookie store (sessions do)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use ao3_client::config::ClientConfig;
/// use ao3_client::requester::build_http_client;
///
/// let client = build_http_client(&ClientConfig::default(), false).unwrap();
/// ```
pub fn build_http_client(config: &ClientConfig, cookies: bool) -> reqwest::Result<Client> {
    let https_only = config.archive.base_url.starts_with("https://");

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.requests.timeout_secs))
        .connect_timeout(Duration::from_secs(config.requests.connect_timeout_secs))
        .redirect(Policy::none()) // Handle redirects manually
        .https_only(https_only)
        .cookie_store(cookies)
        .gzip(true)
        .brotli(true)
        .build()
}

/// The single point every archive request goes through
///
/// One gateway is created per process (or per test) and shared through an
/// `Arc` by every entity. It owns the request budget, so all entities draw
/// from the same allowance.
#[derive(Debug)]
pub struct Gateway {
    client: Client,
    budget: RequestBudget,
    base_url: Url,
    config: ClientConfig,
}

impl Gateway {
    /// Creates a gateway from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - A validated client configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Gateway)` - Ready to send requests
    /// * `Err(Ao3Error)` - The base URL is invalid or the client could not be built
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.archive.base_url)?;
        let client = build_http_client(&config, false)?;
        let budget = RequestBudget::new(
            config.requests.max_per_window,
            Duration::from_secs(config.requests.window_secs),
        );

        debug!(base_url = %base_url, limited = budget.is_limited(), "Gateway created");
        Ok(Self {
            client,
            budget,
            base_url,
            config,
        })
    }

    /// Creates a gateway with default settings pointing at `base_url`
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let mut config = ClientConfig::default();
        config.archive.base_url = base_url.to_string();
        Self::new(config)
    }

    pub fn budget(&self) -> &RequestBudget {
        &self.budget
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolves an archive path such as `/works/123` against the base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// The absolute form of an archive path, as used in `Location` comparisons
    pub fn absolute(&self, path: &str) -> String {
        self.url(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.to_string())
    }

    /// Builds a client with a cookie store for an authenticated session
    pub(crate) fn session_client(&self) -> Result<Client> {
        Ok(build_http_client(&self.config, true)?)
    }

    /// Sends a request, following redirects when the request asks for it
    ///
    /// # Request Flow
    ///
    /// 1. Await the request budget
    /// 2. Send with the session's client if one is given, else the gateway's
    /// 3. HTTP 429 → `RateLimited`, never retried here
    /// 4. On 3xx with `Location`, repeat from 1 for the next hop (GET only,
    ///    unless the request opted in); loops and chains over 10 hops fail
    ///
    /// Every other status is returned to the caller, which decides what it means.
    pub async fn send(
        &self,
        request: ArchiveRequest,
        session: Option<&Session>,
    ) -> Result<RawResponse> {
        let (url, response) = self.dispatch(&request, session).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|source| Ao3Error::Http {
            url: url.to_string(),
            source,
        })?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "Response received");

        Ok(RawResponse {
            status,
            headers,
            url,
            body,
        })
    }

    /// Fetches a binary resource such as a work download
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - The response body
    /// * `Err(Ao3Error::Download)` - The final response was not a success
    pub async fn download(&self, url: Url, session: Option<&Session>) -> Result<Vec<u8>> {
        let (url, response) = self.dispatch(&ArchiveRequest::get(url), session).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Ao3Error::Download(format!(
                "{} answered {}",
                url,
                status.as_u16()
            )));
        }
        let bytes = response.bytes().await.map_err(|source| Ao3Error::Http {
            url: url.to_string(),
            source,
        })?;
        debug!(%url, bytes = bytes.len(), "Download received");
        Ok(bytes.to_vec())
    }

    /// Runs the budget and redirect loop, returning the final hop unread
    async fn dispatch(
        &self,
        request: &ArchiveRequest,
        session: Option<&Session>,
    ) -> Result<(Url, reqwest::Response)> {
        let client = session.map(Session::client).unwrap_or(&self.client);
        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut visited: HashSet<String> = HashSet::new();
        let mut hops = 0;

        loop {
            visited.insert(url.to_string());
            self.budget.acquire().await;
            debug!(%method, %url, "Sending request");

            let mut builder = client.request(method.clone(), url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if hops == 0 && !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if method == Method::POST {
                if let Some(form) = &request.form {
                    builder = builder.form(form);
                }
            }

            let response = builder.send().await.map_err(|source| Ao3Error::Http {
                url: url.to_string(),
                source,
            })?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(%url, "Archive answered 429");
                return Err(Ao3Error::RateLimited);
            }

            if request.follow_redirects && status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    hops += 1;
                    if hops > MAX_REDIRECTS {
                        return Err(Ao3Error::unexpected(format!(
                            "More than {} redirects starting at {}",
                            MAX_REDIRECTS, request.url
                        )));
                    }

                    let next = url.join(&location)?;
                    if visited.contains(next.as_str()) {
                        return Err(Ao3Error::unexpected(format!(
                            "Redirect loop detected at {}",
                            next
                        )));
                    }

                    trace!(from = %url, to = %next, status = status.as_u16(), "Following redirect");
                    if status != StatusCode::TEMPORARY_REDIRECT
                        && status != StatusCode::PERMANENT_REDIRECT
                    {
                        method = Method::GET;
                    }
                    url = next;
                    continue;
                }
            }

            return Ok((url, response));
        }
    }

    /// GET with redirects followed
    pub async fn get(&self, url: Url, session: Option<&Session>) -> Result<RawResponse> {
        self.send(ArchiveRequest::get(url), session).await
    }

    /// GET returning the body as a new snapshot, whatever the status
    pub async fn get_document(&self, url: Url, session: Option<&Session>) -> Result<Snapshot> {
        Ok(self.get(url, session).await?.into_snapshot())
    }

    /// POST a url-encoded form without following redirects
    ///
    /// # Arguments
    ///
    /// * `url` - Target URL
    /// * `form` - Form fields, sent in order
    /// * `headers` - Extra request headers
    /// * `query` - Query string parameters
    /// * `session` - Session whose cookies authenticate the request
    pub async fn post_form(
        &self,
        url: Url,
        form: Vec<(String, String)>,
        headers: &[(&str, &str)],
        query: &[(&str, &str)],
        session: Option<&Session>,
    ) -> Result<RawResponse> {
        let mut request = ArchiveRequest::post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        for (name, value) in query {
            request = request.query(*name, *value);
        }
        self.send(request, session).await
    }
}
