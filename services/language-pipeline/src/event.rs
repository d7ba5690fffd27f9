//! Object-write notifications that trigger the stages.
//!
//! The workflow layer forwards the storage audit event unchanged; only the
//! bucket, key and upload size are read from it.

use serde::Deserialize;

/// Storage write notification
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectWriteEvent {
    pub detail: EventDetail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    pub request_parameters: RequestParameters,
    /// Absent for copies and multipart completions
    #[serde(default)]
    pub additional_event_data: Option<AdditionalEventData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    pub bucket_name: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalEventData {
    /// Reported as a JSON number that may carry a fractional part
    #[serde(default)]
    pub bytes_transferred_in: Option<f64>,
}

impl ObjectWriteEvent {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn bucket(&self) -> &str {
        &self.detail.request_parameters.bucket_name
    }

    pub fn key(&self) -> &str {
        &self.detail.request_parameters.key
    }

    /// Uploaded size in bytes, rounded to the nearest byte.
    ///
    /// Zero when the event does not report a finite, positive size, which the
    /// validator then rejects as an empty batch.
    pub fn size_bytes(&self) -> u64 {
        self.detail
            .additional_event_data
            .as_ref()
            .and_then(|data| data.bytes_transferred_in)
            .filter(|bytes| bytes.is_finite() && *bytes > 0.0)
            .map(|bytes| bytes.round() as u64)
            .unwrap_or(0)
    }
}
