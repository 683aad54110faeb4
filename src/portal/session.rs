//! Stateful HTTP transport shared by every portal interaction.
//!
//! The portal runs two virtual hosts (the academic system and the identity
//! provider) behind the same SSO deployment, and its load balancer routes on
//! the `Host`/`Referer`/`Origin` triple. Those three headers form a
//! [`DomainProfile`] that the handshake swaps wholesale as it crosses
//! domains; everything else in the header set is a fixed browser identity.
//!
//! Redirects are never followed automatically: intermediate `30x` responses
//! carry session-establishing cookies, and the handshake must read each
//! `Location` target itself so the cookie jar sees every hop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.99 Safari/537.36";

/// The `Host`/`Referer`/`Origin` triple for one of the two participating
/// domains. Replaced as a unit at handshake transitions, never mutated
/// field-by-field.
#[derive(Debug, Clone)]
pub struct DomainProfile {
    pub host: String,
    pub referer: String,
    pub origin: String,
}

impl DomainProfile {
    /// Profile for a base URL, with the base itself as referer.
    pub fn for_base(base: &Url) -> Self {
        let origin = base.origin().ascii_serialization();
        Self {
            host: base.host_str().unwrap_or_default().to_string(),
            referer: base.to_string(),
            origin,
        }
    }

    /// Same domain, different referer page.
    pub fn with_referer(mut self, referer: &str) -> Self {
        self.referer = referer.to_string();
        self
    }
}

/// Persistent HTTP client carrying cookies and browser-mimicking headers
/// across every call of a run.
pub struct Session {
    http: ClientWithMiddleware,
    jar: Arc<Jar>,
    profile: DomainProfile,
    authenticated: bool,
}

impl Session {
    /// Build a session with a bounded per-request timeout, an exponential
    /// backoff retry decorator on transient failures, and no automatic
    /// redirect following.
    pub fn new(initial: DomainProfile, timeout: Duration, max_retries: u32) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"macOS\""));
        headers.insert(
            "sec-ch-ua",
            HeaderValue::from_static(
                "\" Not A;Brand\";v=\"99\", \"Chromium\";v=\"98\", \"Google Chrome\";v=\"98\"",
            ),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let http = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            http,
            jar,
            profile: initial,
            authenticated: false,
        })
    }

    /// Seed the cookie jar with previously captured cookies, for the
    /// reauthentication path that skips the full handshake.
    pub fn seed_cookies(&self, cookies: &str, url: &Url) {
        for pair in cookies.split(';') {
            let pair = pair.trim();
            if !pair.is_empty() {
                self.jar.add_cookie_str(pair, url);
            }
        }
    }

    /// Replace the domain profile wholesale.
    pub fn set_profile(&mut self, profile: DomainProfile) {
        tracing::trace!(host = profile.host.as_str(), "switching domain profile");
        self.profile = profile;
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// GET without following redirects; the caller inspects `Location` itself.
    pub async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let resp = self
            .http
            .get(url.clone())
            .header(header::HOST, self.profile.host.as_str())
            .header(header::REFERER, self.profile.referer.as_str())
            .header(header::ORIGIN, self.profile.origin.as_str())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        Ok(resp)
    }

    /// POST a form-encoded body. An explicit referer overrides the profile's
    /// (save/finalize requests must carry the page they came from).
    pub async fn post_form(
        &self,
        url: Url,
        form: &[(String, String)],
        referer: Option<&Url>,
    ) -> Result<reqwest::Response> {
        let referer = referer
            .map(|r| r.to_string())
            .unwrap_or_else(|| self.profile.referer.clone());
        let resp = self
            .http
            .post(url.clone())
            .header(header::HOST, self.profile.host.as_str())
            .header(header::REFERER, referer.as_str())
            .header(header::ORIGIN, self.profile.origin.as_str())
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        Ok(resp)
    }
}

/// Read a response's `Location` header resolved against the request URL.
/// Returns `None` when the response is not a redirect.
pub fn redirect_target(resp: &reqwest::Response) -> Option<Url> {
    let raw = resp.headers().get(header::LOCATION)?.to_str().ok()?;
    resp.url().join(raw).ok()
}
