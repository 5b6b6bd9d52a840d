//! Control plane URLs
//!
//! Every URL is derived from the configured `http(s)` base endpoint. The
//! WebSocket variants switch the scheme to `ws(s)`. All of them carry the
//! agent token as a query parameter.

use reqwest::Url;

use hl_protocol::RequestId;

use crate::error::ConfigError;

const REPORT_PATH: &str = "/api/clients/report";
const TERMINAL_PATH: &str = "/api/clients/terminal";
const TASK_RESULT_PATH: &str = "/api/clients/task/result";
const BASIC_INFO_PATH: &str = "/api/clients/uploadBasicInfo";

/// URL builder for one control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
    token: String,
}

impl Endpoints {
    /// Validate the base endpoint and remember the token
    pub fn new(endpoint: &str, token: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(endpoint.trim().trim_end_matches('/'))
            .map_err(|e| ConfigError::Invalid(format!("endpoint '{}': {}", endpoint, e)))?;

        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "endpoint scheme must be http or https, got '{}'",
                    other
                )))
            }
        }

        Ok(Self {
            base,
            token: token.to_string(),
        })
    }

    /// WebSocket URL of the report transport
    pub fn report_ws(&self) -> Url {
        self.websocket(REPORT_PATH, &[])
    }

    /// WebSocket URL of a dedicated terminal transport
    pub fn terminal_ws(&self, request_id: &RequestId) -> Url {
        self.websocket(TERMINAL_PATH, &[("id", request_id.as_str())])
    }

    /// HTTP URL for fallback report delivery
    pub fn report_http(&self) -> Url {
        self.http(REPORT_PATH, &[])
    }

    /// HTTP URL for task result uploads
    pub fn task_result(&self) -> Url {
        self.http(TASK_RESULT_PATH, &[])
    }

    /// HTTP URL for basic info uploads
    pub fn basic_info(&self) -> Url {
        self.http(BASIC_INFO_PATH, &[])
    }

    fn http(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, path));
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", &self.token);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        url
    }

    fn websocket(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.http(path, params);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) stays within the special schemes, which `Url` permits
        if url.set_scheme(scheme).is_err() {
            tracing::warn!("Could not switch {} to {}", url, scheme);
        }
        url
    }
}
