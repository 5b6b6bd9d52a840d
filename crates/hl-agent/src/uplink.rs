//! HTTP uploads to the control plane

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

use hl_core::error::UplinkError;
use hl_core::traits::Uplink;
use hl_core::Endpoints;
use hl_protocol::{BasicInfo, Report, TaskResult};

/// `Uplink` over plain HTTP POSTs with JSON bodies
pub struct HttpUplink {
    client: Client,
    endpoints: Endpoints,
}

impl HttpUplink {
    /// Create an uplink whose requests give up after `timeout`
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, UplinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hostlink-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UplinkError::Request(e.to_string()))?;

        Ok(Self { client, endpoints })
    }

    async fn post<T: Serialize + ?Sized>(&self, url: Url, body: &T) -> Result<(), UplinkError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            // The URL carries the token
            .map_err(|e| UplinkError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(UplinkError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Uplink for HttpUplink {
    async fn post_report(&self, report: &Report) -> Result<(), UplinkError> {
        self.post(self.endpoints.report_http(), report).await
    }

    async fn post_task_result(&self, result: &TaskResult) -> Result<(), UplinkError> {
        self.post(self.endpoints.task_result(), result).await
    }

    async fn post_basic_info(&self, info: &BasicInfo) -> Result<(), UplinkError> {
        self.post(self.endpoints.basic_info(), info).await
    }
}
