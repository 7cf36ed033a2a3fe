//! Blocking HTTP plumbing shared by the API clients.
//!
//! Every request goes through [`HttpClient::execute`], which enforces a minimum
//! interval between calls and retries transport failures, HTTP 429 and 5xx
//! responses with a linear backoff.

use super::{ApiError, ApiResult};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::cell::Cell;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timeouts, throttling and retry knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub min_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            min_interval: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Throttled, retrying wrapper around a blocking reqwest client.
#[derive(Debug)]
pub struct HttpClient {
    system: &'static str,
    client: Client,
    settings: HttpSettings,
    last_request: Cell<Option<Instant>>,
}

impl HttpClient {
    /// Build a client for the named remote system.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(system: &'static str, settings: HttpSettings) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("tferry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            system,
            client,
            settings,
            last_request: Cell::new(None),
        })
    }

    #[must_use]
    pub const fn system(&self) -> &'static str {
        self.system
    }

    /// Send the request produced by `build` and decode the JSON body.
    ///
    /// `build` is called once per attempt because blocking request builders
    /// cannot be replayed.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` on 401/403, `Http` on other non-success statuses
    /// once retries are exhausted, `Transport` on network failures and
    /// `Decode` if the body is not the expected JSON.
    pub fn execute<T, F>(&self, what: &str, build: F) -> ApiResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle();
            debug!(system = self.system, what, attempt, "Sending request");

            match build(&self.client).send() {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(ApiError::Unauthorized {
                            system: self.system.to_string(),
                            detail: format!("HTTP {} on {what}", status.as_u16()),
                        });
                    }

                    if is_retryable(status) && attempt <= self.settings.max_retries {
                        warn!(
                            system = self.system,
                            what,
                            status = status.as_u16(),
                            attempt,
                            "Retryable response, backing off"
                        );
                        self.backoff(attempt);
                        continue;
                    }

                    if !status.is_success() {
                        let body = error_body(response.text(), self.system, what);
                        return Err(ApiError::Http {
                            status: status.as_u16(),
                            body: truncate(&body, 300),
                        });
                    }

                    return response
                        .json::<T>()
                        .map_err(|e| ApiError::Decode(format!("{what}: {e}")));
                }
                Err(err) => {
                    if attempt > self.settings.max_retries {
                        return Err(ApiError::Transport(err));
                    }
                    warn!(
                        system = self.system,
                        what,
                        attempt,
                        error = %err,
                        "Request failed, retrying"
                    );
                    self.backoff(attempt);
                }
            }
        }
    }

    fn throttle(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.settings.min_interval {
                std::thread::sleep(self.settings.min_interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn backoff(&self, attempt: u32) {
        std::thread::sleep(self.settings.retry_delay * attempt);
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Body of a failed response; an unreadable body is logged and left empty.
fn error_body<E: std::fmt::Display>(read: Result<String, E>, system: &str, what: &str) -> String {
    read.unwrap_or_else(|e| {
        debug!(system, what, error = %e, "Could not read error response body");
        String::new()
    })
}

fn truncate(body: &str, max: usize) -> String {
    if body.chars().count() <= max {
        return body.to_string();
    }
    let mut out: String = body.chars().take(max).collect();
    out.push_str("...");
    out
}
