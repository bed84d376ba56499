use crate::models::{ChannelMessage, Destination};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// One message addressed to an ordered list of destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Caller-supplied correlation id
    pub ref_tag: String,
    pub recipients: Vec<Destination>,
    pub message: ChannelMessage,
}

impl DispatchRequest {
    pub fn new(
        ref_tag: impl Into<String>,
        recipients: Vec<Destination>,
        message: ChannelMessage,
    ) -> Self {
        Self {
            ref_tag: ref_tag.into(),
            recipients,
            message,
        }
    }
}

/// Outcome of delivering to a single recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientResult {
    pub recipient: String,
    pub status_code: u16,
    pub status_text: String,
}

impl RecipientResult {
    pub fn new(recipient: impl Into<String>, status: StatusCode, status_text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status_code: status.as_u16(),
            status_text: status_text.into(),
        }
    }

    pub fn success(recipient: impl Into<String>) -> Self {
        Self::new(recipient, StatusCode::OK, "Success")
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }
}

/// Aggregated outcome of a dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub ref_tag: String,
    pub results: Vec<RecipientResult>,
}

impl DispatchResponse {
    /// The shared status code when every recipient agrees, `207` otherwise
    pub fn overall_status(&self) -> StatusCode {
        let mut codes = self.results.iter().map(|r| r.status_code);
        match codes.next() {
            None => StatusCode::OK,
            Some(first) if codes.all(|code| code == first) => {
                StatusCode::from_u16(first).unwrap_or(StatusCode::MULTI_STATUS)
            }
            Some(_) => StatusCode::MULTI_STATUS,
        }
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(codes: &[u16]) -> DispatchResponse {
        DispatchResponse {
            ref_tag: "ref-1".to_string(),
            results: codes
                .iter()
                .enumerate()
                .map(|(i, code)| RecipientResult {
                    recipient: format!("r{}", i),
                    status_code: *code,
                    status_text: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_uniform_status() {
        assert_eq!(response(&[200, 200]).overall_status(), StatusCode::OK);
        assert_eq!(
            response(&[503, 503, 503]).overall_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_mixed_status_is_multi_status() {
        let resp = response(&[200, 400, 503]);
        assert_eq!(resp.overall_status(), StatusCode::MULTI_STATUS);
        assert_eq!(resp.success_count(), 1);
        assert_eq!(resp.failure_count(), 2);
    }
}
