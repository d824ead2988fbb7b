use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub description: String,
    pub score: f32,
    pub topicality: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualObject {
    pub name: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualElements {
    pub objects: Vec<VisualObject>,
}

impl VisualElements {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifications {
    pub document_type: String,
    pub language: Option<String>,
}

impl Default for Classifications {
    fn default() -> Self {
        Self {
            document_type: "unknown".to_string(),
            language: None,
        }
    }
}

/// Output of the secondary analysis capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub text: String,
    pub labels: Vec<Label>,
    pub visual_elements: VisualElements,
    pub classifications: Classifications,
    pub confidence: f32,
}

/// The part of an analysis that ends up in document metadata. `Default` is the
/// empty summary used when the analysis failed, timed out or was skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub processed: bool,
    pub labels: Vec<Label>,
    pub visual_elements: VisualElements,
    pub classifications: Classifications,
    pub confidence: f32,
}

impl From<&AnalysisResult> for AnalysisSummary {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            processed: true,
            labels: result.labels.clone(),
            visual_elements: result.visual_elements.clone(),
            classifications: result.classifications.clone(),
            confidence: result.confidence,
        }
    }
}
