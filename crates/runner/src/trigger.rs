//! Actions that drive the system under test while assertions run.

use std::collections::BTreeMap;
use std::time::Duration;

use e2e_verify_assert::expand_env;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::oneshot;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::config::TriggerConfig;
use crate::error::{Error, Result};

/// Something that keeps stimulating the system under test.
pub trait Trigger: Send + Sync {
    /// Start the action. The receiver yields exactly one outcome: `Ok` once
    /// the action succeeded or was stopped, or the last error once it gave
    /// up. Must be called within a tokio runtime.
    fn start(&self) -> oneshot::Receiver<Result<()>>;

    /// Stop the action; a pending [`Trigger::start`] receiver yields `Ok`.
    fn stop(&self);
}

/// Build the trigger described by `config`.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for an unknown action, or the error of
/// [`HttpTrigger::from_config`].
pub fn from_config(config: &TriggerConfig) -> Result<Box<dyn Trigger>> {
    if config.action.eq_ignore_ascii_case("http") {
        Ok(Box::new(HttpTrigger::from_config(config)?))
    } else {
        Err(Error::configuration(format!("unknown trigger action '{}'", config.action)))
    }
}

#[derive(Debug, Clone)]
struct Request {
    url: String,
    method: Method,
    body: String,
    headers: HeaderMap,
}

/// Sends an HTTP request every interval until one is answered with 200.
#[derive(Debug)]
pub struct HttpTrigger {
    interval: Duration,
    times: u32,
    request: Request,
    client: reqwest::Client,
    stop: CancellationToken,
}

impl HttpTrigger {
    /// Create an HTTP trigger.
    ///
    /// The URL is environment-expanded and the method upper-cased.
    /// `times == 0` keeps sending until success or [`Trigger::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] for a zero interval and
    /// [`Error::Configuration`] for an invalid method or header.
    pub fn new(
        interval: Duration,
        times: u32,
        url: &str,
        method: &str,
        body: impl Into<String>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::invalid_interval(
                "trigger interval",
                format!("{interval:?}"),
                "trigger interval should be > 0",
            ));
        }

        let method_name = if method.is_empty() { "GET".to_string() } else { method.to_ascii_uppercase() };
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| Error::configuration(format!("invalid trigger method '{method_name}'")))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::configuration(format!("invalid trigger header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::configuration(format!("invalid value for trigger header '{name}'")))?;
            header_map.insert(name, value);
        }

        let url = expand_env(url);
        let client = reqwest::Client::builder()
            .build()
            .map_err(|source| Error::TriggerRequest {
                url: url.clone(),
                source,
            })?;

        Ok(Self {
            interval,
            times,
            request: Request {
                url,
                method,
                body: body.into(),
                headers: header_map,
            },
            client,
            stop: CancellationToken::new(),
        })
    }

    /// Create an HTTP trigger from the `trigger` configuration section.
    ///
    /// # Errors
    ///
    /// See [`HttpTrigger::new`] and [`TriggerConfig::interval`].
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        Self::new(
            config.interval()?,
            config.times,
            &config.url,
            &config.method,
            config.body.clone(),
            &config.headers,
        )
    }

    /// The target URL after environment expansion.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.request.url
    }
}

impl Trigger for HttpTrigger {
    fn start(&self) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let request = self.request.clone();
        let stop = self.stop.clone();
        let (period, times) = (self.interval, self.times);

        tracing::info!(
            url = %request.url,
            times,
            interval = ?period,
            "Trigger will request URL"
        );

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            let mut sent = 0_u32;
            let outcome = loop {
                tokio::select! {
                    () = stop.cancelled() => break Ok(()),
                    _ = ticker.tick() => {}
                }

                sent = sent.saturating_add(1);
                match send(&client, &request).await {
                    Ok(()) => {
                        tracing::debug!(url = %request.url, sent, "Trigger request succeeded");
                        break Ok(());
                    }
                    Err(e) if times > 0 && sent >= times => break Err(e),
                    Err(e) => tracing::debug!(url = %request.url, sent, error = %e, "Trigger request failed"),
                }
            };

            // The receiver may have been dropped; nothing left to report to.
            let _ = tx.send(outcome);
        });

        rx
    }

    fn stop(&self) {
        self.stop.cancel();
    }
}

async fn send(client: &reqwest::Client, request: &Request) -> Result<()> {
    let response = client
        .request(request.method.clone(), &request.url)
        .headers(request.headers.clone())
        .body(request.body.clone())
        .send()
        .await
        .map_err(|source| Error::TriggerRequest {
            url: request.url.clone(),
            source,
        })?;

    let status = response.status();
    // Drain the body so the connection can be reused.
    let _ = response.bytes().await;
    if status == reqwest::StatusCode::OK {
        Ok(())
    } else {
        Err(Error::TriggerStatus {
            url: request.url.clone(),
            status: status.as_u16(),
        })
    }
}
