//! OCR stage: document image bytes in, raw text plus a confidence score out.
//!
//! The production engine calls the Google Cloud Vision `images:annotate`
//! endpoint with a TEXT_DETECTION feature. Everything downstream works
//! against the `OcrEngine` trait so tests can swap in `MockOcr`.

use std::collections::VecDeque;
use std::sync::Mutex;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ──────────────────────────────────────────────
// Constants
// ──────────────────────────────────────────────

const VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Per-file upload cap, enforced before any upstream call is made.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR service not reachable")]
    NotReachable,

    #[error("OCR request timed out")]
    Timeout,

    #[error("OCR API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("OCR processing failed: {0}")]
    Processing(String),
}

/// Result of one OCR pass over one image.
///
/// `confidence` is a percentage in 0.0..=100.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrOutcome {
    pub text: String,
    pub confidence: f64,
}

impl OcrOutcome {
    /// Outcome for a blank page or an exhausted mock: no text, no confidence.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

/// Seam between the import pipeline and the OCR backend.
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image_bytes: &[u8]) -> Result<OcrOutcome, OcrError>;
}

/// Reject oversized uploads before they reach the OCR backend.
pub fn validate_image_size(bytes: &[u8]) -> Result<(), OcrError> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(OcrError::Processing(format!(
            "image exceeds {} MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Run OCR over a batch sequentially. A failure on one image never aborts
/// the batch; the failed slot carries an empty outcome so positional
/// alignment with the input is preserved.
pub fn extract_text_batch(engine: &dyn OcrEngine, images: &[Vec<u8>]) -> Vec<OcrOutcome> {
    images
        .iter()
        .enumerate()
        .map(|(i, bytes)| match engine.extract_text(bytes) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(image_index = i, error = %e, "OCR failed for image");
                OcrOutcome::empty()
            }
        })
        .collect()
}

// ──────────────────────────────────────────────
// GoogleVisionOcr
// ──────────────────────────────────────────────

/// Production OCR engine backed by Google Cloud Vision TEXT_DETECTION.
pub struct GoogleVisionOcr {
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<ImageRequest<'a>>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: ImageContent,
    features: Vec<Feature<'a>>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    feature_type: &'a str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<VisionError>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    description: String,
}

#[derive(Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    pages: Vec<AnnotationPage>,
}

#[derive(Deserialize)]
struct AnnotationPage {
    #[serde(default)]
    confidence: f64,
}

#[derive(Deserialize)]
struct VisionError {
    message: String,
}

impl GoogleVisionOcr {
    pub fn new(api_key: String) -> Result<Self, OcrError> {
        Self::with_endpoint(api_key, VISION_ENDPOINT.to_string())
    }

    /// Endpoint override for tests against a local stub.
    pub fn with_endpoint(api_key: String, endpoint: String) -> Result<Self, OcrError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| OcrError::Processing(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint,
        })
    }

    fn map_transport_error(e: reqwest::Error) -> OcrError {
        if e.is_connect() {
            OcrError::NotReachable
        } else if e.is_timeout() {
            OcrError::Timeout
        } else {
            OcrError::Processing(e.to_string())
        }
    }
}

impl OcrEngine for GoogleVisionOcr {
    fn extract_text(&self, image_bytes: &[u8]) -> Result<OcrOutcome, OcrError> {
        let _span =
            tracing::info_span!("vision_ocr", image_size = image_bytes.len()).entered();
        let start = std::time::Instant::now();

        validate_image_size(image_bytes)?;

        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(image_bytes),
                },
                features: vec![Feature {
                    feature_type: "TEXT_DETECTION",
                }],
            }],
        };

        let response = self
            .client
            .post(format!("{}?key={}", self.endpoint, self.api_key))
            .json(&body)
            .send()
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(OcrError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: AnnotateResponse = response
            .json()
            .map_err(|e| OcrError::Processing(format!("invalid annotate response: {e}")))?;

        let image_response = parsed.responses.into_iter().next().unwrap_or_default();
        if let Some(err) = image_response.error {
            return Err(OcrError::Processing(err.message));
        }

        // First annotation is the full-page text; no annotations means a
        // blank page, which is not an error.
        let text = image_response
            .text_annotations
            .first()
            .map(|a| a.description.clone())
            .unwrap_or_default();

        let confidence = image_response
            .full_text_annotation
            .and_then(|f| f.pages.first().map(|p| p.confidence * 100.0))
            .unwrap_or(0.0);

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            confidence,
            "OCR extraction complete"
        );

        Ok(OcrOutcome { text, confidence })
    }
}

// ──────────────────────────────────────────────
// MockOcr (testing)
// ──────────────────────────────────────────────

/// Mock OCR engine with a queue of scripted outcomes. Each call pops the
/// next outcome; an exhausted queue yields empty outcomes.
pub struct MockOcr {
    outcomes: Mutex<VecDeque<OcrOutcome>>,
}

impl MockOcr {
    pub fn new(outcomes: Vec<OcrOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
        }
    }

    /// Single scripted outcome, repeated shape for one-image tests.
    pub fn single(text: &str, confidence: f64) -> Self {
        Self::new(vec![OcrOutcome {
            text: text.to_string(),
            confidence,
        }])
    }
}

impl OcrEngine for MockOcr {
    fn extract_text(&self, _image_bytes: &[u8]) -> Result<OcrOutcome, OcrError> {
        let mut queue = self.outcomes.lock().unwrap();
        Ok(queue.pop_front().unwrap_or_else(OcrOutcome::empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_image_rejected() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(validate_image_size(&bytes).is_err());
    }

    #[test]
    fn max_size_image_accepted() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES];
        assert!(validate_image_size(&bytes).is_ok());
    }

    #[test]
    fn mock_pops_in_order_then_goes_empty() {
        let mock = MockOcr::new(vec![
            OcrOutcome {
                text: "first".into(),
                confidence: 90.0,
            },
            OcrOutcome {
                text: "second".into(),
                confidence: 80.0,
            },
        ]);
        assert_eq!(mock.extract_text(b"a").unwrap().text, "first");
        assert_eq!(mock.extract_text(b"b").unwrap().text, "second");
        let third = mock.extract_text(b"c").unwrap();
        assert!(third.text.is_empty());
        assert_eq!(third.confidence, 0.0);
    }

    #[test]
    fn batch_preserves_positions() {
        let mock = MockOcr::new(vec![
            OcrOutcome {
                text: "page one".into(),
                confidence: 95.0,
            },
            OcrOutcome::empty(),
            OcrOutcome {
                text: "page three".into(),
                confidence: 85.0,
            },
        ]);
        let outcomes = extract_text_batch(&mock, &[vec![1], vec![2], vec![3]]);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].text, "page one");
        assert!(outcomes[1].text.is_empty());
        assert_eq!(outcomes[2].text, "page three");
    }

    #[test]
    fn failing_engine_never_aborts_batch() {
        struct FailingOcr;
        impl OcrEngine for FailingOcr {
            fn extract_text(&self, _bytes: &[u8]) -> Result<OcrOutcome, OcrError> {
                Err(OcrError::NotReachable)
            }
        }

        let outcomes = extract_text_batch(&FailingOcr, &[vec![1], vec![2]]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.text.is_empty()));
    }

    #[test]
    fn annotate_response_parses_without_annotations() {
        let json = r#"{"responses":[{}]}"#;
        let parsed: AnnotateResponse = serde_json::from_str(json).unwrap();
        let first = parsed.responses.into_iter().next().unwrap();
        assert!(first.text_annotations.is_empty());
        assert!(first.error.is_none());
    }

    #[test]
    fn annotate_response_parses_error_field() {
        let json = r#"{"responses":[{"error":{"message":"bad image"}}]}"#;
        let parsed: AnnotateResponse = serde_json::from_str(json).unwrap();
        let first = parsed.responses.into_iter().next().unwrap();
        assert_eq!(first.error.unwrap().message, "bad image");
    }

    #[test]
    fn annotate_response_parses_text_and_confidence() {
        let json = r#"{"responses":[{
            "textAnnotations":[{"description":"Maria Silva\nCPF: 123"}],
            "fullTextAnnotation":{"pages":[{"confidence":0.92}]}
        }]}"#;
        let parsed: AnnotateResponse = serde_json::from_str(json).unwrap();
        let first = parsed.responses.into_iter().next().unwrap();
        assert_eq!(first.text_annotations[0].description, "Maria Silva\nCPF: 123");
        let conf = first.full_text_annotation.unwrap().pages[0].confidence;
        assert!((conf - 0.92).abs() < f64::EPSILON);
    }
}
