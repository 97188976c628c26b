//! Extraction worker messages
//!
//! Everything crossing the worker boundary is owned and serializable: the
//! request carries a copy of the clip samples, the response a copy of the grid.

use serde::{Deserialize, Serialize};

use crate::features::{extract_normalized, FeatureParams, NormalizedGrid};

/// One clip to turn into a classifier-ready grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub samples: Vec<f32>,
    /// Native rate of `samples` (Hz)
    pub source_rate: u32,
    /// Target rate, band count, frame count and STFT constants
    pub params: FeatureParams,
}

impl ExtractionRequest {
    pub fn new(samples: Vec<f32>, source_rate: u32, params: FeatureParams) -> Self {
        Self {
            samples,
            source_rate,
            params,
        }
    }

    /// Run the extraction chain in the current context
    pub fn run(&self) -> ExtractionResponse {
        extract_normalized(&self.samples, self.source_rate, &self.params).into()
    }
}

/// Worker reply, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExtractionResponse {
    Ok { grid: NormalizedGrid },
    Error { message: String },
}

impl ExtractionResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ExtractionResponse::Error {
            message: message.into(),
        }
    }

    pub fn into_result(self) -> Result<NormalizedGrid, String> {
        match self {
            ExtractionResponse::Ok { grid } => Ok(grid),
            ExtractionResponse::Error { message } => Err(message),
        }
    }
}

impl<E: std::fmt::Display> From<Result<NormalizedGrid, E>> for ExtractionResponse {
    fn from(result: Result<NormalizedGrid, E>) -> Self {
        match result {
            Ok(grid) => ExtractionResponse::Ok { grid },
            Err(e) => ExtractionResponse::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_wire_format() {
        let response = ExtractionResponse::error("corrupt input");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "error", "message": "corrupt input" }));
    }

    #[test]
    fn test_ok_response_wire_format() {
        let request = ExtractionRequest::new(vec![0.0; 512], 22050, FeatureParams::default());
        let response = request.run();

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["grid"]["frames"].as_array().unwrap().len(), 96);

        let parsed: ExtractionResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_run_reports_corrupt_samples() {
        let request = ExtractionRequest::new(vec![0.0, f32::NAN, 0.0], 22050, FeatureParams::default());
        let message = request.run().into_result().unwrap_err();
        assert!(message.contains("index 1"), "unexpected message: {}", message);
    }

    #[test]
    fn test_request_carries_pipeline_constants() {
        let request = ExtractionRequest::new(vec![0.25; 4], 44100, FeatureParams::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["source_rate"], 44100);
        assert_eq!(json["params"]["target_rate"], 22050);
        assert_eq!(json["params"]["mel_bands"], 64);
        assert_eq!(json["params"]["frame_count"], 96);
    }
}
