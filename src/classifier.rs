//! Client for the external emotion classifier.
//!
//! The classifier is a black box behind one HTTP endpoint: it receives a
//! still image and answers with an emotion label, a focus score on a 0-6
//! scale, and optional learning-state and feedback fields. Responses that
//! do not meet that contract are rejected here so the rest of the pipeline
//! only ever sees well-formed results.

use crate::capture::Frame;
use crate::config::ClassifierSettings;
use crate::core::gate::GateCues;
use crate::core::observation::{LearningState, Observation, MAX_FOCUS_SCORE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Feedback action that asks for a break.
pub const BREAK_ACTION: &str = "break";

/// Classifier endpoint configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Full URL of the analyze endpoint
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClassifierConfig {
    /// Create a new classifier configuration.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the persisted settings block.
    pub fn from_settings(settings: &ClassifierSettings) -> Self {
        Self::new(settings.endpoint.clone()).with_timeout(Duration::from_secs(settings.timeout_secs))
    }

    /// Get the analyze endpoint URL.
    pub fn analyze_url(&self) -> &str {
        &self.endpoint
    }

    /// Get the health check URL on the same origin as the endpoint.
    pub fn health_url(&self) -> Result<String, ClassifierError> {
        let url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ClassifierError::Config(format!("Invalid endpoint '{}': {e}", self.endpoint)))?;
        url.join("/health")
            .map(|u| u.to_string())
            .map_err(|e| ClassifierError::Config(e.to_string()))
    }
}

/// Classifier error types.
#[derive(Debug)]
pub enum ClassifierError {
    /// Configuration error
    Config(String),
    /// Network error or timeout
    Unreachable(String),
    /// Classifier answered with a non-success status
    Server { status: u16, message: String },
    /// Response body did not meet the contract
    Malformed(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::Config(msg) => write!(f, "Classifier config error: {msg}"),
            ClassifierError::Unreachable(msg) => write!(f, "Classifier unreachable: {msg}"),
            ClassifierError::Server { status, message } => {
                write!(f, "Classifier server error ({status}): {message}")
            }
            ClassifierError::Malformed(msg) => write!(f, "Classifier response malformed: {msg}"),
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Request body for the analyze endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    /// Frame encoded as a `data:` URL
    pub image: String,
}

impl AnalyzeRequest {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            image: frame.to_data_url(),
        }
    }
}

/// Feedback attached to a classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Response body as it arrives on the wire, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub emotion: Option<String>,
    pub score: Option<f64>,
    #[serde(default)]
    pub learning_state: Option<LearningState>,
    #[serde(default)]
    pub is_sleeping: Option<bool>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

/// A validated classifier result.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub emotion: String,
    /// Focus score in `[0, 6]`
    pub score: f64,
    pub learning_state: LearningState,
    pub is_sleeping: bool,
    pub feedback: Option<Feedback>,
}

impl ClassificationResult {
    /// Check a raw response against the contract.
    pub fn validate(raw: RawResponse) -> Result<Self, ClassifierError> {
        let emotion = raw
            .emotion
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ClassifierError::Malformed("missing emotion".to_string()))?;

        let score = raw
            .score
            .ok_or_else(|| ClassifierError::Malformed("missing score".to_string()))?;
        if !score.is_finite() || !(0.0..=MAX_FOCUS_SCORE).contains(&score) {
            return Err(ClassifierError::Malformed(format!(
                "score {score} outside [0, {MAX_FOCUS_SCORE}]"
            )));
        }

        Ok(Self {
            emotion,
            score,
            learning_state: raw.learning_state.unwrap_or_default(),
            is_sleeping: raw.is_sleeping.unwrap_or(false),
            feedback: raw.feedback,
        })
    }

    /// Whether the classifier explicitly asked for a break.
    pub fn requests_break(&self) -> bool {
        self.feedback
            .as_ref()
            .map(|f| f.action == BREAK_ACTION)
            .unwrap_or(false)
    }

    /// The observation recorded for this result.
    pub fn to_observation(&self, at: DateTime<Utc>) -> Observation {
        Observation::new(at, self.emotion.clone(), self.score, self.learning_state)
    }

    /// The signals the intervention gate evaluates.
    pub fn cues(&self) -> GateCues {
        GateCues {
            learning_state: self.learning_state,
            break_requested: self.requests_break(),
            is_sleeping: self.is_sleeping,
            message: self
                .feedback
                .as_ref()
                .map(|f| f.message.clone())
                .filter(|m| !m.is_empty()),
            resource: self
                .feedback
                .as_ref()
                .and_then(|f| f.resource.clone())
                .filter(|r| !r.is_empty()),
        }
    }
}

/// Anything that can classify a frame.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> Result<ClassificationResult, ClassifierError>;
}

/// HTTP classifier client.
pub struct HttpClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    /// Create a new classifier client.
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Test connection to the classifier.
    pub async fn test_connection(&self) -> Result<bool, ClassifierError> {
        let response = self
            .client
            .get(self.config.health_url()?)
            .send()
            .await
            .map_err(|e| ClassifierError::Unreachable(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, frame: &Frame) -> Result<ClassificationResult, ClassifierError> {
        let response = self
            .client
            .post(self.config.analyze_url())
            .header("Content-Type", "application/json")
            .json(&AnalyzeRequest::from_frame(frame))
            .send()
            .await
            .map_err(|e| ClassifierError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClassifierError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        ClassificationResult::validate(raw)
    }
}
