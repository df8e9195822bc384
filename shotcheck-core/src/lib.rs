//! ShotCheck Core - Product Image Compliance
//!
//! # Components
//! 1. Rule Classifier: analysis result in, issues by severity out
//! 2. Mask Compositor: photo + segmentation mask in, violation overlay out
//!
//! Neither component depends on the other. `CompliancePipeline` wires them
//! together the way the presentation layer consumes them.

pub mod analysis;
pub mod classifier;
pub mod compositor;
pub mod config;
pub mod hashing;
pub mod pipeline;

pub use analysis::{AnalysisResult, Dimensions, ProductFill, QualityMetrics};
pub use classifier::{
    categorize_issues, CategorizedIssues, ComplianceRule, Issue, IssuePriority, IssueStatus,
    RuleClassifier, RuleContext,
};
pub use compositor::{
    composite_images, composite_violation_overlay, flag_background_violations, CompositeError,
    CompositeOutput, ImageLoader, ImageRole,
};
pub use config::{ConfigError, LoaderConfig};
pub use hashing::{canonical_json, compute_report_hash, sha256_hex};
pub use pipeline::{CheckRequest, ComplianceReport, CompliancePipeline, OverlayOutcome, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
