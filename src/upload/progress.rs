//! Progress events and session states

use serde::{Deserialize, Serialize};

/// Status carried by a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Uploading)
    }
}

/// Session lifecycle: Idle -> Uploading -> {Completed, Failed, Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A single progress update delivered to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub percentage: u8,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn uploading(
        percentage: u8,
        speed: Option<String>,
        time_remaining: Option<String>,
    ) -> Self {
        Self {
            percentage: percentage.min(100),
            status: UploadStatus::Uploading,
            speed,
            time_remaining,
            error: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            percentage: 100,
            status: UploadStatus::Completed,
            speed: None,
            time_remaining: None,
            error: None,
        }
    }

    pub fn failed(percentage: u8, error: impl Into<String>) -> Self {
        Self {
            percentage,
            status: UploadStatus::Failed,
            speed: None,
            time_remaining: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(percentage: u8) -> Self {
        Self {
            percentage,
            status: UploadStatus::Cancelled,
            speed: None,
            time_remaining: None,
            error: Some("Upload was cancelled".to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Percentage of `done` over `total`, rounded to the nearest integer
pub fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
