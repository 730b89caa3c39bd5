pub mod client;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod stage;
pub mod tool;

// Re-export commonly used types
pub use client::{
    CompletionReply, ModelReply, ReasoningModelClient, ToolInvocation, VisionFeatureExtractor,
};
pub use error::{DialogueError, Result};
pub use message::{
    AnalysisRequest, AnalysisResponse, DEFAULT_DISCLAIMER, DiagnosisResult, DialogueTurn,
    ImagePayload, PipelineMode, Role, Stage,
};
pub use orchestrator::ConversationOrchestrator;
pub use prompt::{ContentPart, ImageUrl, PromptContent, PromptTurn};
pub use stage::{DIAGNOSIS_HISTORY_THRESHOLD, StagePlan};
pub use tool::{SUBMIT_DIAGNOSIS, diagnosis_tool};
