use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::application::recommendations::HealthStatus;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            code: None,
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            code: None,
        }
    }

    pub fn failure(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            message: message.into(),
            data: None,
            code: Some(code),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub product_id: String,
    pub event_type: String,
}

/// `?limit=` kept as raw text so bad values fall back instead of rejecting.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    pub fn resolve(&self, default: NonZeroU32) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|limit| *limit > 0)
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(default.get() as usize)
    }
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub service: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
}

impl From<HealthStatus> for HealthResponse {
    fn from(status: HealthStatus) -> Self {
        let label = |up: bool| if up { "UP" } else { "DOWN" };
        Self {
            service: "UP",
            database: label(status.database),
            cache: label(status.cache),
        }
    }
}
