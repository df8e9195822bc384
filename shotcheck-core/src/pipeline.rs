//! Compliance Pipeline - Single Entry Point
//!
//! Classifies an analysis and, when the background has violations, builds
//! the overlay. A failed overlay degrades to the unmodified source image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::classifier::{CategorizedIssues, RuleClassifier};
use crate::compositor::{CompositeError, ImageLoader, ImageRole};
use crate::config::LoaderConfig;
use crate::hashing::compute_report_hash;
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub analysis: AnalysisResult,
    /// Original photo; required for an overlay.
    #[serde(default)]
    pub source_url: Option<String>,
    /// Non-white pixel count from before a fix attempt.
    #[serde(default)]
    pub baseline_non_white_pixels: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OverlayOutcome {
    /// No background violations, or nothing to draw on.
    NotRequired,
    #[serde(rename_all = "camelCase")]
    Composited {
        data_url: String,
        flagged_pixels: usize,
        sha256: String,
    },
    /// Compositing failed; show the original instead.
    #[serde(rename_all = "camelCase")]
    Fallback {
        image_url: String,
        failed_image: Option<ImageRole>,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub compliance_score: f64,
    pub is_compliant: bool,
    pub issues: CategorizedIssues,
    pub overlay: OverlayOutcome,
    pub report_hash: String,
}

/// Hashed view of a report: everything except per-run identity.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDigest<'a> {
    engine_version: &'a str,
    compliance_score: f64,
    is_compliant: bool,
    issues: &'a CategorizedIssues,
    overlay: &'a OverlayOutcome,
}

impl ComplianceReport {
    /// Hash of the report content; `id` and `createdAt` are excluded.
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        compute_report_hash(&ReportDigest {
            engine_version: &self.engine_version,
            compliance_score: self.compliance_score,
            is_compliant: self.is_compliant,
            issues: &self.issues,
            overlay: &self.overlay,
        })
    }
}

/// The compliance pipeline - classification plus overlay
pub struct CompliancePipeline {
    classifier: RuleClassifier,
    loader: ImageLoader,
}

impl CompliancePipeline {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            classifier: RuleClassifier::new(),
            loader: ImageLoader::new(config),
        }
    }

    pub fn classify(&self, request: &CheckRequest) -> CategorizedIssues {
        self.classifier
            .classify(Some(&request.analysis), request.baseline_non_white_pixels)
    }

    /// Build the overlay for a request, falling back to the source image.
    pub async fn overlay(&self, request: &CheckRequest) -> OverlayOutcome {
        let (Some(source_url), Some(mask_url)) = (
            request.source_url.as_deref(),
            request.analysis.segmentation_url.as_deref(),
        ) else {
            return OverlayOutcome::NotRequired;
        };
        if !request.analysis.has_background_violations() {
            return OverlayOutcome::NotRequired;
        }

        match self.loader.composite(source_url, mask_url).await {
            Ok(output) => OverlayOutcome::Composited {
                data_url: output.to_data_url(),
                flagged_pixels: output.flagged_pixels,
                sha256: output.sha256(),
            },
            Err(err) => fallback(source_url, err),
        }
    }

    #[instrument(name = "compliance_check", skip_all)]
    pub async fn check(&self, request: &CheckRequest) -> Result<ComplianceReport, PipelineError> {
        let issues = self.classify(request);
        let overlay = self.overlay(request).await;

        let mut report = ComplianceReport {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            compliance_score: request.analysis.compliance_score,
            is_compliant: request.analysis.is_compliant,
            issues,
            overlay,
            report_hash: String::new(), // Computed after
        };
        report.report_hash = report.content_hash()?;

        info!(
            report_id = %report.id,
            critical = report.issues.critical.len(),
            important = report.issues.important.len(),
            minor = report.issues.minor.len(),
            "compliance check complete"
        );
        Ok(report)
    }
}

impl Default for CompliancePipeline {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

fn fallback(source_url: &str, err: CompositeError) -> OverlayOutcome {
    warn!(error = %err, "overlay failed, showing original image");
    OverlayOutcome::Fallback {
        image_url: source_url.to_string(),
        failed_image: err.role(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_overlay_without_violations() {
        let request = CheckRequest {
            analysis: AnalysisResult {
                segmentation_url: Some("mask.png".to_string()),
                ..AnalysisResult::minimal(0)
            },
            source_url: Some("photo.png".to_string()),
            baseline_non_white_pixels: None,
        };
        let outcome = CompliancePipeline::default().overlay(&request).await;
        assert_eq!(outcome, OverlayOutcome::NotRequired);
    }

    #[tokio::test]
    async fn test_no_overlay_without_source() {
        let request = CheckRequest {
            analysis: AnalysisResult {
                segmentation_url: Some("mask.png".to_string()),
                ..AnalysisResult::minimal(40)
            },
            source_url: None,
            baseline_non_white_pixels: None,
        };
        let outcome = CompliancePipeline::default().overlay(&request).await;
        assert_eq!(outcome, OverlayOutcome::NotRequired);
    }

    #[tokio::test]
    async fn test_identical_checks_share_report_hash() {
        let request = CheckRequest {
            analysis: AnalysisResult::minimal(120),
            source_url: None,
            baseline_non_white_pixels: Some(400),
        };
        let pipeline = CompliancePipeline::default();
        let first = pipeline.check(&request).await.unwrap();
        let second = pipeline.check(&request).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.report_hash, second.report_hash);
        assert_eq!(first.report_hash, first.content_hash().unwrap());

        let other = CheckRequest {
            baseline_non_white_pixels: None,
            ..request
        };
        let third = pipeline.check(&other).await.unwrap();
        assert_ne!(first.report_hash, third.report_hash);
    }

    #[test]
    fn test_overlay_outcome_wire_shape() {
        let outcome = OverlayOutcome::Fallback {
            image_url: "https://cdn.example.com/a.jpg".to_string(),
            failed_image: Some(ImageRole::Mask),
            reason: "boom".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "fallback");
        assert_eq!(json["imageUrl"], "https://cdn.example.com/a.jpg");
        assert_eq!(json["failedImage"], "mask");
    }
}
