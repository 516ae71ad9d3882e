//! REST client for a Komari-compatible monitoring backend

use super::{PublicInfo, TelemetrySource};
use crate::config::BackendConfig;
use crate::error::{SourceError, SourceResult};
use crate::latency::PingHistory;
use crate::model::{ApiResponse, HostRecord, RawMetrics};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Clone)]
pub struct KomariClient {
    http: reqwest::Client,
    base: Url,
}

impl KomariClient {
    pub fn new(config: &BackendConfig) -> SourceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, base: base_url(&config.base_url)? })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> SourceResult<Url> {
        Ok(self.base.join(path)?)
    }

    /// GET an enveloped endpoint and unwrap `data`
    async fn get_data<T: DeserializeOwned>(&self, url: Url) -> SourceResult<T> {
        let body = self.http.get(url).send().await?.error_for_status()?.text().await?;
        unwrap_envelope(&body)
    }
}

/// Parse the backend URL so that relative joins keep its path
pub(crate) fn base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(raw.trim())?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// Decode `{status, message, data}`; anything but success is an API error
fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> SourceResult<T> {
    let envelope: ApiResponse<T> = serde_json::from_str(body)?;
    match envelope.data {
        Some(data) if envelope.is_success() => Ok(data),
        _ => Err(SourceError::Api {
            status: envelope.status,
            message: if envelope.message.is_empty() { "request failed".into() } else { envelope.message },
        }),
    }
}

#[async_trait]
impl TelemetrySource for KomariClient {
    async fn list_hosts(&self) -> SourceResult<Vec<HostRecord>> {
        let url = self.endpoint("api/nodes")?;
        self.get_data(url).await
    }

    async fn current_metrics(&self, host_id: &str) -> SourceResult<Option<RawMetrics>> {
        let url = self.endpoint(&format!("api/recent/{host_id}"))?;
        let reports: Vec<RawMetrics> = self.get_data(url).await?;
        Ok(reports.into_iter().next())
    }

    async fn server_version(&self) -> String {
        let Ok(url) = self.endpoint("api/version") else {
            return String::new();
        };
        match self.get_data::<VersionInfo>(url).await {
            Ok(info) => info.version,
            Err(e) => {
                debug!("Version lookup failed: {}", e);
                String::new()
            }
        }
    }

    async fn ping_history(&self, host_id: &str, window_hours: u32) -> SourceResult<PingHistory> {
        let mut url = self.endpoint("api/records/ping")?;
        url.query_pairs_mut()
            .append_pair("uuid", host_id)
            .append_pair("hours", &window_hours.to_string());

        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            warn!("Ping history for {} returned HTTP {}", host_id, resp.status());
            return Ok(PingHistory::default());
        }
        let body = resp.text().await?;
        match unwrap_envelope::<PingHistory>(&body) {
            Ok(history) => Ok(history),
            Err(SourceError::Api { .. }) => Ok(PingHistory::default()),
            Err(e) => Err(e),
        }
    }

    async fn public_info(&self) -> SourceResult<PublicInfo> {
        let url = self.endpoint("api/public")?;
        self.get_data(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_envelope() {
        let hosts: Vec<HostRecord> =
            unwrap_envelope(r#"{"status":"success","message":"","data":[{"uuid":"a"}]}"#).unwrap();
        assert_eq!(hosts[0].uuid, "a");

        let err = unwrap_envelope::<Vec<HostRecord>>(r#"{"status":"error","message":"denied","data":null}"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Api { ref message, .. } if message == "denied"));

        let err = unwrap_envelope::<Vec<HostRecord>>("<html>").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let client = KomariClient::new(&BackendConfig {
            base_url: "https://status.example.net/".into(),
            request_timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            client.endpoint("api/recent/abc").unwrap().as_str(),
            "https://status.example.net/api/recent/abc"
        );
    }

    #[test]
    fn test_base_path_without_trailing_slash() {
        let base = base_url("http://10.0.0.5:8080/monitor").unwrap();
        assert_eq!(base.join("api/nodes").unwrap().as_str(), "http://10.0.0.5:8080/monitor/api/nodes");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = KomariClient::new(&BackendConfig { base_url: "not a url".into(), request_timeout_secs: 5 })
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidUrl(_)));
    }
}
