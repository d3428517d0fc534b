//! JSON shapes returned by the AITRIOS console API.
//!
//! Only the fields the monitor reads are modelled; everything else is ignored.

use serde::Deserialize;

/// `GET /devices/{id}`
#[derive(Debug, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "connectionState", default)]
    pub connection_state: Option<String>,
    #[serde(default)]
    pub state: Option<DeviceStateBlock>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceStateBlock {
    #[serde(rename = "Status", default)]
    pub status: Option<DeviceStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceStatus {
    #[serde(rename = "ApplicationProcessor", default)]
    pub application_processor: Option<String>,
}

/// One element of `GET /devices/images/directories`.
#[derive(Debug, Default, Deserialize)]
pub struct DirectoryGroup {
    #[serde(default)]
    pub devices: Vec<DeviceDirectories>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceDirectories {
    #[serde(default)]
    pub device_id: Option<String>,
    /// Image sub-directory names, oldest first.
    #[serde(rename = "Image", default)]
    pub image: Vec<String>,
}

/// `GET /devices/{id}/images/directories/{sub}`
#[derive(Debug, Default, Deserialize)]
pub struct ImageList {
    #[serde(default)]
    pub images: Vec<ImageEntry>,
}

/// A stored image; `contents` is base64 encoded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ImageEntry {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

/// The inference results endpoint answers with a bare list; anything else is treated as
/// "no results".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InferenceResultsResponse {
    Records(Vec<InferenceRecord>),
    Other(serde_json::Value),
}

impl InferenceResultsResponse {
    /// All inferences of all records, in received order.
    pub fn into_inferences(self) -> Vec<Inference> {
        match self {
            InferenceResultsResponse::Records(records) => records
                .into_iter()
                .filter_map(|record| record.inference_result)
                .flat_map(|result| result.inferences)
                .collect(),
            InferenceResultsResponse::Other(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InferenceRecord {
    #[serde(default)]
    pub inference_result: Option<InferenceResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InferenceResult {
    #[serde(rename = "Inferences", default)]
    pub inferences: Vec<Inference>,
}

/// One inference entry: `T` is the capture timestamp, `O` the base64 detection record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Inference {
    #[serde(rename = "T", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "O", default)]
    pub payload: Option<String>,
}

/// Response of `collectstart` / `collectstop`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CommandOutcome {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub message: String,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.result == "SUCCESS"
    }
}

/// `POST` to the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
