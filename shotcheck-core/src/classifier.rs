//! Rule Classifier - Findings by Severity
//!
//! Rules produce at most one issue each.
//! The issue's priority decides its bucket.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::AnalysisResult;

/// Minimum reduction against the baseline for a re-check to count as fixed.
pub const BACKGROUND_FIX_THRESHOLD_PCT: f64 = 75.0;
pub const PRODUCT_FILL_REQUIRED_PCT: f64 = 85.0;
pub const MIN_DPI: f64 = 72.0;
pub const MIN_LONGEST_SIDE: u32 = 1000;
pub const ZOOM_LONGEST_SIDE: u32 = 1600;
pub const ACCEPTED_FORMATS: [&str; 6] = ["jpeg", "jpg", "png", "gif", "tiff", "tif"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssuePriority {
    Critical,
    Important,
    Minor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub name: String,
    pub status: IssueStatus,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub priority: IssuePriority,
}

impl Issue {
    fn new(
        name: &str,
        status: IssueStatus,
        priority: IssuePriority,
        value: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status,
            value: value.into(),
            details: Some(details.into()),
            priority,
        }
    }

    fn pass(name: &str, value: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(name, IssueStatus::Pass, IssuePriority::Minor, value, details)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategorizedIssues {
    pub critical: Vec<Issue>,
    pub important: Vec<Issue>,
    pub minor: Vec<Issue>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
}

impl CategorizedIssues {
    /// Append to the bucket named by the issue's own priority.
    pub fn push(&mut self, issue: Issue) {
        match issue.priority {
            IssuePriority::Critical => self.critical.push(issue),
            IssuePriority::Important => self.important.push(issue),
            IssuePriority::Minor => self.minor.push(issue),
        }
    }

    pub fn bucket(&self, priority: IssuePriority) -> &[Issue] {
        match priority {
            IssuePriority::Critical => &self.critical,
            IssuePriority::Important => &self.important,
            IssuePriority::Minor => &self.minor,
        }
    }

    /// Critical first, then important, then minor.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.critical
            .iter()
            .chain(self.important.iter())
            .chain(self.minor.iter())
    }

    pub fn total(&self) -> usize {
        self.critical.len() + self.important.len() + self.minor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn has_critical(&self) -> bool {
        !self.critical.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Issue> {
        self.iter().find(|i| i.name == name)
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.iter().fold(StatusCounts::default(), |mut acc, issue| {
            match issue.status {
                IssueStatus::Pass => acc.pass += 1,
                IssueStatus::Warn => acc.warn += 1,
                IssueStatus::Fail => acc.fail += 1,
            }
            acc
        })
    }
}

/// Inputs a rule may consult besides the analysis itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext {
    /// Non-white pixel count from the analysis before a fix attempt.
    pub baseline_non_white_pixels: Option<i64>,
}

/// Compliance rule trait - yields an issue, or nothing when its inputs are absent
pub trait ComplianceRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, result: &AnalysisResult, ctx: &RuleContext) -> Option<Issue>;
}

// --- Concrete Rules ---

pub struct WhiteBackgroundRule;

impl ComplianceRule for WhiteBackgroundRule {
    fn name(&self) -> &'static str { "White Background" }

    fn evaluate(&self, result: &AnalysisResult, ctx: &RuleContext) -> Option<Issue> {
        let non_white = result.non_white_pixels;

        if non_white == 0 {
            return Some(Issue::pass(
                self.name(),
                "Background is pure white",
                "No non-white pixels detected in the background",
            ));
        }

        if let Some(baseline) = ctx.baseline_non_white_pixels.filter(|b| *b > 0) {
            // Float math: negative or extreme counts must not overflow.
            let pct = (baseline as f64 - non_white as f64) / baseline as f64 * 100.0;

            if pct >= BACKGROUND_FIX_THRESHOLD_PCT {
                return Some(Issue::pass(
                    self.name(),
                    format!("Fixed! {:.1}% of non-white pixels removed", pct),
                    format!(
                        "{} non-white pixels remain, down from {}",
                        format_count(non_white),
                        format_count(baseline)
                    ),
                ));
            }

            return Some(Issue::new(
                self.name(),
                IssueStatus::Fail,
                IssuePriority::Critical,
                format!(
                    "{} non-white pixels remain ({:.1}% reduction)",
                    format_count(non_white),
                    pct
                ),
                format!(
                    "At least {:.0}% of the original {} non-white pixels must be removed",
                    BACKGROUND_FIX_THRESHOLD_PCT,
                    format_count(baseline)
                ),
            ));
        }

        Some(Issue::new(
            self.name(),
            IssueStatus::Fail,
            IssuePriority::Critical,
            format!("{} non-white pixels detected", format_count(non_white)),
            "Main images require a pure white background, RGB(255, 255, 255)",
        ))
    }
}

pub struct ProductFillRule;

impl ComplianceRule for ProductFillRule {
    fn name(&self) -> &'static str { "Product Fill" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let fill = result.product_fill.as_ref()?;
        if fill.passes_85_rule {
            return None;
        }

        Some(Issue::new(
            self.name(),
            IssueStatus::Warn,
            IssuePriority::Important,
            format!(
                "{:.1}% (requires {:.0}%)",
                fill.percentage, PRODUCT_FILL_REQUIRED_PCT
            ),
            "The product should fill at least 85% of the image frame",
        ))
    }
}

pub struct DpiRule;

impl ComplianceRule for DpiRule {
    fn name(&self) -> &'static str { "DPI" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let dpi = result.quality.as_ref()?.dpi?;

        if dpi < MIN_DPI {
            Some(Issue::new(
                self.name(),
                IssueStatus::Warn,
                IssuePriority::Minor,
                format!("{:.0} DPI", dpi),
                "Below 72 DPI; the image may look soft on high-density screens",
            ))
        } else {
            Some(Issue::pass(
                self.name(),
                format!("{:.0} DPI", dpi),
                "Resolution density is adequate",
            ))
        }
    }
}

pub struct ImageQualityRule;

impl ComplianceRule for ImageQualityRule {
    fn name(&self) -> &'static str { "Image Quality" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let score = result.quality.as_ref()?.overall_score?;
        let value = format!("{}/100", score.round() as i64);

        let issue = if score < 60.0 {
            Issue::new(
                self.name(),
                IssueStatus::Fail,
                IssuePriority::Critical,
                value,
                "Image is blurry, noisy or badly exposed; reshoot or use a higher quality source",
            )
        } else if score < 75.0 {
            Issue::new(
                self.name(),
                IssueStatus::Warn,
                IssuePriority::Important,
                value,
                "Acceptable, but sharpness or exposure could be improved",
            )
        } else {
            Issue::pass(self.name(), value, "Sharpness and exposure look good")
        };
        Some(issue)
    }
}

pub struct ColorSpaceRule;

impl ComplianceRule for ColorSpaceRule {
    fn name(&self) -> &'static str { "Color Space" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let color_space = result.quality.as_ref()?.color_space.as_deref()?;
        let value = color_space.to_uppercase();

        let (status, priority, details) = match value.as_str() {
            "RGB" | "SRGB" => (IssueStatus::Pass, IssuePriority::Minor, "Web-safe color space"),
            "CMYK" => (
                IssueStatus::Fail,
                IssuePriority::Critical,
                "CMYK images render with shifted colors online; convert to sRGB",
            ),
            _ => (
                IssueStatus::Warn,
                IssuePriority::Important,
                "sRGB is recommended for consistent display",
            ),
        };
        Some(Issue::new(self.name(), status, priority, value, details))
    }
}

pub struct ImageSizeRule;

impl ComplianceRule for ImageSizeRule {
    fn name(&self) -> &'static str { "Image Size" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let longest = result.dimensions.as_ref()?.longest_side();
        let value = format!("{}px longest side", longest);

        let issue = if longest < MIN_LONGEST_SIDE {
            Issue::new(
                self.name(),
                IssueStatus::Fail,
                IssuePriority::Critical,
                value,
                "At least 1000px on the longest side is required",
            )
        } else if longest < ZOOM_LONGEST_SIDE {
            Issue::new(
                self.name(),
                IssueStatus::Warn,
                IssuePriority::Important,
                value,
                "1600px or more is recommended to enable zoom",
            )
        } else {
            Issue::pass(self.name(), value, "Large enough for zoom")
        };
        Some(issue)
    }
}

pub struct AspectRatioRule;

impl ComplianceRule for AspectRatioRule {
    fn name(&self) -> &'static str { "Aspect Ratio" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let dims = result.dimensions.as_ref()?;
        if dims.width == 0 || dims.height == 0 {
            return None;
        }

        let divisor = gcd(dims.width, dims.height);
        let (w, h) = (dims.width / divisor, dims.height / divisor);

        if w == 1 && h == 1 {
            Some(Issue::pass(self.name(), "1:1 (Square)", "Square images display best"))
        } else {
            Some(Issue::new(
                self.name(),
                IssueStatus::Warn,
                IssuePriority::Important,
                format!("{}:{}", w, h),
                "A 1:1 square ratio is recommended",
            ))
        }
    }
}

pub struct FileFormatRule;

impl ComplianceRule for FileFormatRule {
    fn name(&self) -> &'static str { "File Format" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let format = result.quality.as_ref().and_then(|q| q.format.as_deref());
        let accepted = format
            .map(|f| ACCEPTED_FORMATS.iter().any(|a| a.eq_ignore_ascii_case(f)))
            .unwrap_or(false);
        let value = format
            .map(str::to_uppercase)
            .unwrap_or_else(|| "Unknown".to_string());

        if accepted {
            Some(Issue::pass(self.name(), value, "Accepted file format"))
        } else {
            Some(Issue::new(
                self.name(),
                IssueStatus::Fail,
                IssuePriority::Important,
                value,
                "Accepted formats: JPEG, PNG, GIF, TIFF",
            ))
        }
    }
}

pub struct FileSizeRule;

impl ComplianceRule for FileSizeRule {
    fn name(&self) -> &'static str { "File Size" }

    fn evaluate(&self, result: &AnalysisResult, _ctx: &RuleContext) -> Option<Issue> {
        let size_mb = result
            .quality
            .as_ref()
            .and_then(|q| q.file_size_mb)
            .unwrap_or(0.0);
        let value = format!("{:.2} MB", size_mb);

        let issue = if size_mb > 10.0 {
            Issue::new(
                self.name(),
                IssueStatus::Fail,
                IssuePriority::Critical,
                value,
                "Files over 10 MB are rejected",
            )
        } else if size_mb > 5.0 {
            Issue::new(
                self.name(),
                IssueStatus::Warn,
                IssuePriority::Important,
                value,
                "Files over 5 MB upload slowly; consider compressing",
            )
        } else {
            Issue::pass(self.name(), value, "Within size limits")
        };
        Some(issue)
    }
}

/// Classifier runs every rule in a fixed order and buckets the results
pub struct RuleClassifier {
    rules: Vec<Box<dyn ComplianceRule>>,
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(WhiteBackgroundRule),
                Box::new(ProductFillRule),
                Box::new(DpiRule),
                Box::new(ImageQualityRule),
                Box::new(ColorSpaceRule),
                Box::new(ImageSizeRule),
                Box::new(AspectRatioRule),
                Box::new(FileFormatRule),
                Box::new(FileSizeRule),
            ],
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn classify(
        &self,
        result: Option<&AnalysisResult>,
        baseline_non_white_pixels: Option<i64>,
    ) -> CategorizedIssues {
        let mut issues = CategorizedIssues::default();
        let Some(result) = result else {
            return issues;
        };

        let ctx = RuleContext { baseline_non_white_pixels };
        for rule in &self.rules {
            if let Some(issue) = rule.evaluate(result, &ctx) {
                issues.push(issue);
            }
        }

        debug!(
            critical = issues.critical.len(),
            important = issues.important.len(),
            minor = issues.minor.len(),
            baseline = ?baseline_non_white_pixels,
            "classified analysis result"
        );
        issues
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify with the default rule set.
pub fn categorize_issues(
    result: Option<&AnalysisResult>,
    baseline_non_white_pixels: Option<i64>,
) -> CategorizedIssues {
    RuleClassifier::new().classify(result, baseline_non_white_pixels)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Pixel counts with thousands separators, e.g. `12,345`.
fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
