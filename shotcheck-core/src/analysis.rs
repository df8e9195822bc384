//! Analysis Result - Upstream Contract
//!
//! Shape of the payload produced by the remote image analyzer.
//! Everything beyond `nonWhitePixels` may be absent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub compliance_score: f64,
    #[serde(default)]
    pub background_pixels: i64,
    pub non_white_pixels: i64,
    #[serde(default)]
    pub product_coverage: f64,
    #[serde(default)]
    pub edge_compliance: f64,
    #[serde(default)]
    pub is_compliant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_fill: Option<ProductFill>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl AnalysisResult {
    /// A result carrying only the always-present pixel count.
    pub fn minimal(non_white_pixels: i64) -> Self {
        Self {
            non_white_pixels,
            ..Default::default()
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// True when the analyzer found non-white background pixels and
    /// supplied a mask to locate them.
    pub fn has_background_violations(&self) -> bool {
        self.non_white_pixels > 0 && self.segmentation_url.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_side: Option<u32>,
    #[serde(default)]
    pub is_compliant: bool,
    #[serde(default)]
    pub zoom_enabled: bool,
    #[serde(default)]
    pub is_optimal: bool,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            longest_side: Some(width.max(height)),
            ..Default::default()
        }
    }

    /// Reported longest side, or the larger of width and height when the
    /// analyzer omitted it.
    pub fn longest_side(&self) -> u32 {
        self.longest_side.unwrap_or_else(|| self.width.max(self.height))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    #[serde(default)]
    pub dpi: Option<f64>,
    #[serde(default)]
    pub sharpness_score: Option<f64>,
    #[serde(default)]
    pub file_size: Option<f64>,
    #[serde(default, rename = "fileSizeMB")]
    pub file_size_mb: Option<f64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub color_space: Option<String>,
    #[serde(default)]
    pub compression_quality: Option<f64>,
    #[serde(default)]
    pub exposure_score: Option<f64>,
    #[serde(default)]
    pub overall_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductFill {
    #[serde(default)]
    pub percentage: f64,
    #[serde(default, rename = "passes85Rule")]
    pub passes_85_rule: bool,
    #[serde(default)]
    pub product_pixels: u64,
    #[serde(default)]
    pub total_pixels: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_payload() {
        let result = AnalysisResult::from_json(r#"{"nonWhitePixels": 12}"#).unwrap();
        assert_eq!(result.non_white_pixels, 12);
        assert!(result.quality.is_none());
        assert!(result.dimensions.is_none());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_parses_full_payload() {
        let payload = r#"{
            "complianceScore": 82.5,
            "backgroundPixels": 40000,
            "nonWhitePixels": 300,
            "productCoverage": 78.0,
            "edgeCompliance": 99.1,
            "isCompliant": false,
            "segmentationUrl": "https://cdn.example.com/mask.png",
            "dimensions": {"width": 2000, "height": 1500, "longestSide": 2000,
                           "isCompliant": true, "zoomEnabled": true, "isOptimal": true},
            "quality": {"dpi": 300, "sharpnessScore": 91.2, "fileSize": 2097152,
                        "fileSizeMB": 2.0, "format": "jpeg", "colorSpace": "sRGB",
                        "compressionQuality": 92, "exposureScore": 80, "overallScore": 88.4},
            "productFill": {"percentage": 78.0, "passes85Rule": false,
                            "productPixels": 2340000, "totalPixels": 3000000},
            "issues": ["Background not pure white"]
        }"#;
        let result = AnalysisResult::from_json(payload).unwrap();
        let quality = result.quality.as_ref().unwrap();
        assert_eq!(quality.file_size_mb, Some(2.0));
        assert_eq!(quality.color_space.as_deref(), Some("sRGB"));
        assert!(!result.product_fill.as_ref().unwrap().passes_85_rule);
        assert_eq!(result.dimensions.as_ref().unwrap().longest_side(), 2000);
        assert!(result.has_background_violations());
    }

    #[test]
    fn test_longest_side_falls_back_to_larger_edge() {
        let dims: Dimensions = serde_json::from_str(r#"{"width": 800, "height": 1200}"#).unwrap();
        assert_eq!(dims.longest_side(), 1200);
    }

    #[test]
    fn test_negative_counts_are_accepted() {
        let result = AnalysisResult::from_json(r#"{"nonWhitePixels": -5}"#).unwrap();
        assert_eq!(result.non_white_pixels, -5);
        assert!(!result.has_background_violations());
    }

    #[test]
    fn test_missing_pixel_count_is_rejected() {
        assert!(AnalysisResult::from_json(r#"{"complianceScore": 90}"#).is_err());
    }
}
