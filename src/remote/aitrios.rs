use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::types::{
    CommandOutcome, DeviceInfo, DirectoryGroup, ImageEntry, ImageList, Inference,
    InferenceResultsResponse,
};
use super::token::{ClientCredentials, TokenProvider};
use super::{DeviceService, RemoteUnavailable, TokenSource};
use crate::config::MonitorConfig;
use crate::device::{ConnectionState, OperationState};

/// Blocking client for the AITRIOS console REST API, bound to one device.
pub struct AitriosClient {
    agent: ureq::Agent,
    base_url: String,
    device_id: String,
    tokens: Arc<dyn TokenSource>,
}

impl AitriosClient {
    pub fn new(
        base_url: &str,
        device_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.into(),
            tokens,
        }
    }

    /// Client authenticated through the OAuth2 client-credentials grant in `config`.
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(anyhow!(
                "client credentials missing: set AITRIOS_CLIENT_ID and AITRIOS_CLIENT_SECRET"
            ));
        }
        let credentials = ClientCredentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        };
        let timeout = config.timing.request_timeout;
        let tokens = TokenProvider::new(config.token_url.clone(), credentials, timeout);
        Ok(Self::new(
            &config.base_url,
            config.device_id.clone(),
            Arc::new(tokens),
            timeout,
        ))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Appends service-provided names as percent-encoded path segments.
    fn segment_url(&self, segments: &[&str]) -> Result<String> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| segment.is_empty() || matches!(**segment, "." | ".."))
        {
            return Err(anyhow!("refusing path segment {:?}", bad));
        }
        let mut url = url::Url::parse(&self.base_url)
            .with_context(|| format!("parse base url {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("base url {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn authorize(&self, request: ureq::Request) -> Result<ureq::Request> {
        let token = self.tokens.bearer_token().context("obtain access token")?;
        Ok(request
            .set("Authorization", &format!("Bearer {}", token))
            .set("Content-Type", "application/json"))
    }

    fn execute<T: DeserializeOwned>(&self, endpoint: &str, request: ureq::Request) -> Result<T> {
        let response = match self.authorize(request)?.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(RemoteUnavailable::new(endpoint, format!("HTTP {}: {}", code, body)).into());
            }
            Err(err) => return Err(RemoteUnavailable::new(endpoint, err.to_string()).into()),
        };
        let body = response
            .into_string()
            .with_context(|| format!("read response from {}", endpoint))?;
        serde_json::from_str(&body).with_context(|| format!("parse response from {}", endpoint))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        self.execute(path, request)
    }

    fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.execute(path, self.agent.post(&url))
    }

    pub fn device_info(&self) -> Result<DeviceInfo> {
        self.get(&format!("/devices/{}", self.device_id), &[])
    }
}

impl DeviceService for AitriosClient {
    fn device_state(&self) -> Result<(ConnectionState, OperationState)> {
        let info = self.device_info()?;
        let connection = info
            .connection_state
            .as_deref()
            .map(ConnectionState::parse)
            .unwrap_or(ConnectionState::Unknown);
        let operation = info
            .state
            .and_then(|state| state.status)
            .and_then(|status| status.application_processor)
            .as_deref()
            .map(OperationState::parse)
            .unwrap_or(OperationState::Unknown);
        Ok((connection, operation))
    }

    fn image_directories(&self) -> Result<Vec<String>> {
        let groups: Vec<DirectoryGroup> = self.get(
            "/devices/images/directories",
            &[("device_id", self.device_id.as_str())],
        )?;
        Ok(groups
            .into_iter()
            .next()
            .and_then(|group| group.devices.into_iter().next())
            .map(|device| device.image)
            .unwrap_or_default())
    }

    fn latest_image(&self, sub_directory: &str) -> Result<Option<ImageEntry>> {
        let url = self.segment_url(&[
            "devices",
            &self.device_id,
            "images",
            "directories",
            sub_directory,
        ])?;
        let endpoint = format!(
            "/devices/{}/images/directories/{}",
            self.device_id, sub_directory
        );
        let request = self
            .agent
            .get(&url)
            .query("order_by", "DESC")
            .query("number_of_images", "1");
        let list: ImageList = self.execute(&endpoint, request)?;
        Ok(list.images.into_iter().next())
    }

    fn inference_results(&self, count: usize) -> Result<Vec<Inference>> {
        let count = count.to_string();
        let response: InferenceResultsResponse = self.get(
            &format!("/devices/{}/inferenceresults", self.device_id),
            &[
                ("NumberOfInferenceresults", count.as_str()),
                ("raw", "1"),
                ("order_by", "DESC"),
            ],
        )?;
        Ok(response.into_inferences())
    }

    fn start_inference(&self) -> Result<CommandOutcome> {
        self.post(&format!(
            "/devices/{}/inferenceresults/collectstart",
            self.device_id
        ))
    }

    fn stop_inference(&self) -> Result<CommandOutcome> {
        self.post(&format!(
            "/devices/{}/inferenceresults/collectstop",
            self.device_id
        ))
    }
}
