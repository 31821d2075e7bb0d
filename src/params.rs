//! Remote parameter module.
//! Reads and writes named values in the camera's parameter store over plain HTTP GET
//! (`/axis-cgi/param.cgi`). Every parameter lives under one namespace (the application group).
//! Reads answer with a single `name=value` line; writes only care about the status code.

use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub const PARAM_CGI: &str = "/axis-cgi/param.cgi";

/// Failures talking to the parameter store. Both variants name the parameter involved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("failed to read parameter {param}: {reason}")]
    Read { param: String, reason: String },
    #[error("failed to write parameter {param}: {reason}")]
    Write { param: String, reason: String },
}

impl ParamError {
    pub fn param(&self) -> &str {
        match self {
            ParamError::Read { param, .. } | ParamError::Write { param, .. } => param,
        }
    }
}

/// Key-value store the calibration session persists its points to.
pub trait ParamStore: Send + Sync + 'static {
    /// Current value of `name`, as text.
    fn fetch(&self, name: &str) -> impl Future<Output = Result<String, ParamError>> + Send;
    /// Sets `name` to `value`.
    fn update(&self, name: &str, value: &str) -> impl Future<Output = Result<(), ParamError>> + Send;
}

/// `ParamStore` backed by the camera's param.cgi endpoint.
#[derive(Clone, Debug)]
pub struct HttpParamClient {
    client: Client,
    host: String,
    namespace: String,
    credentials: Option<(String, String)>,
}

impl HttpParamClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            credentials: config.credentials(),
        })
    }

    pub fn list_url(&self, name: &str) -> String {
        format!("{}{}?action=list&group={}.{}", self.host, PARAM_CGI, self.namespace, name)
    }

    pub fn update_url(&self, name: &str, value: &str) -> String {
        format!("{}{}?action=update&{}.{}={}", self.host, PARAM_CGI, self.namespace, name, value)
    }

    async fn get(&self, url: &str) -> reqwest::Result<String> {
        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        request.send().await?.error_for_status()?.text().await
    }
}

impl ParamStore for HttpParamClient {
    async fn fetch(&self, name: &str) -> Result<String, ParamError> {
        let read_error = |reason: String| ParamError::Read {
            param: name.to_string(),
            reason,
        };

        let body = self
            .get(&self.list_url(name))
            .await
            .map_err(|e| read_error(e.to_string()))?;

        let value = parse_list_value(&body)
            .ok_or_else(|| read_error(format!("unexpected response '{}'", body.trim())))?;

        log::info!("Got {} value {}", name, value);
        Ok(value.to_string())
    }

    async fn update(&self, name: &str, value: &str) -> Result<(), ParamError> {
        self.get(&self.update_url(name, value))
            .await
            .map_err(|e| ParamError::Write {
                param: name.to_string(),
                reason: e.to_string(),
            })?;

        log::info!("Set {} to {}", name, value);
        Ok(())
    }
}

/// Device-side parameter telling the gauge reader which way the needle turns.
pub const CLOCKWISE_PARAM: &str = "clockwise";

pub async fn get_clockwise<P: ParamStore>(store: &P) -> Result<bool, ParamError> {
    let value = store.fetch(CLOCKWISE_PARAM).await?;
    Ok(value.trim() == "1")
}

pub async fn set_clockwise<P: ParamStore>(store: &P, clockwise: bool) -> Result<(), ParamError> {
    store.update(CLOCKWISE_PARAM, if clockwise { "1" } else { "0" }).await
}

/// Value part of a `group.name=value` response line: everything after the first `=`.
pub fn parse_list_value(body: &str) -> Option<&str> {
    body.split_once('=')
        .map(|(_, value)| value.trim_end_matches(['\r', '\n']))
}
