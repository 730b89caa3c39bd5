use thiserror::Error;

/// Failures a single dialogue turn can end in.
///
/// None of these are retried here. The orchestrator turns each of them into a
/// well-formed [`AnalysisResponse`](crate::AnalysisResponse) instead of
/// propagating it, so the `Display` text doubles as the user-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogueError {
    #[error("Error: vision feature extraction failed: {0}")]
    VisionExtraction(String),

    #[error("Error: reasoning model call failed: {0}")]
    ModelCall(String),

    #[error("Error: failed to parse final diagnosis from the model: {0}")]
    DiagnosisExtraction(String),

    #[error("Error: vision feature extraction failed: strict_local mode requires visual features on the first turn")]
    MissingVisualFeatures,

    #[error("Error: vision feature extraction failed: the extractor returned no description of the image")]
    EmptyVisualFeatures,
}

impl DialogueError {
    /// Stable machine-readable name of the failure category.
    pub fn category(&self) -> &'static str {
        match self {
            DialogueError::VisionExtraction(_)
            | DialogueError::MissingVisualFeatures
            | DialogueError::EmptyVisualFeatures => "vision_extraction",
            DialogueError::ModelCall(_) => "model_call",
            DialogueError::DiagnosisExtraction(_) => "diagnosis_extraction",
        }
    }
}

pub type Result<T> = std::result::Result<T, DialogueError>;
