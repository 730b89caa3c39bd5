use rig::completion::ToolDefinition;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ModelReply, ReasoningModelClient, VisionFeatureExtractor},
    error::{DialogueError, Result},
    message::{AnalysisRequest, AnalysisResponse, DialogueTurn, PipelineMode, Stage},
    prompt, stage,
    tool::{self, SUBMIT_DIAGNOSIS},
};

pub const DIAGNOSIS_CONTENT: &str = "Final differential diagnosis provided.";
pub const DIAGNOSIS_MARKER: &str = "Diagnosis submitted via tool call.";

/// Runs one turn of the diagnostic dialogue.
///
/// Holds no per-conversation state: the caller sends the history it got back
/// from the previous call, and every call is independent of the others.
#[derive(Clone)]
pub struct ConversationOrchestrator {
    vision: Arc<dyn VisionFeatureExtractor>,
    model: Arc<dyn ReasoningModelClient>,
    tools: Vec<ToolDefinition>,
}

impl ConversationOrchestrator {
    pub fn new(
        vision: Arc<dyn VisionFeatureExtractor>,
        model: Arc<dyn ReasoningModelClient>,
    ) -> Self {
        Self {
            vision,
            model,
            tools: vec![tool::diagnosis_tool()],
        }
    }

    /// Process one request. Failures are reported in the response, never returned.
    pub async fn process(&self, request: AnalysisRequest) -> AnalysisResponse {
        match self.run_turn(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(category = e.category(), error = %e, "Dialogue turn failed");
                AnalysisResponse {
                    stage: Stage::Diagnosis,
                    content: e.to_string(),
                    final_diagnosis: None,
                    updated_history: request.history,
                }
            }
        }
    }

    async fn run_turn(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        info!(
            mode = ?request.mode,
            history_len = request.history.len(),
            "Starting dialogue turn"
        );

        let visual_features = match request.mode {
            PipelineMode::StrictLocal => Some(self.extract_features(request).await?),
            PipelineMode::NativeDirect => None,
        };

        let plan = stage::decide(request.history.len());
        let turns = prompt::build(request, &plan, visual_features.as_deref())?;
        debug!(
            turns = turns.len(),
            force_tool = plan.force_tool,
            "Prompt assembled"
        );

        let reply = self
            .model
            .complete(&turns, &self.tools)
            .await
            .map_err(|e| DialogueError::ModelCall(format!("{:#}", e)))?;

        self.interpret(request, ModelReply::from(reply))
    }

    async fn extract_features(&self, request: &AnalysisRequest) -> Result<String> {
        let features = self
            .vision
            .analyze(&request.image)
            .await
            .map_err(|e| DialogueError::VisionExtraction(format!("{:#}", e)))?;

        if features.trim().is_empty() {
            return Err(DialogueError::EmptyVisualFeatures);
        }

        info!(
            features_len = features.len(),
            "Visual features extracted"
        );
        Ok(features)
    }

    fn interpret(&self, request: &AnalysisRequest, reply: ModelReply) -> Result<AnalysisResponse> {
        match reply {
            ModelReply::ToolInvocation { name, arguments } => {
                if name.is_empty() {
                    return Err(DialogueError::DiagnosisExtraction(
                        "tool invocation is missing its function name".to_string(),
                    ));
                }
                if name != SUBMIT_DIAGNOSIS {
                    return Err(DialogueError::DiagnosisExtraction(format!(
                        "model invoked unexpected tool '{}'",
                        name
                    )));
                }

                let diagnosis = tool::parse_diagnosis(&arguments)?;
                info!(
                    options = diagnosis.diagnosis_options.len(),
                    "Diagnosis submitted"
                );

                Ok(AnalysisResponse {
                    stage: Stage::Diagnosis,
                    content: DIAGNOSIS_CONTENT.to_string(),
                    final_diagnosis: Some(diagnosis),
                    updated_history: appended(&request.history, DIAGNOSIS_MARKER),
                })
            }
            ModelReply::FreeText(text) => {
                if stage::decide(request.history.len()).force_tool {
                    warn!("Model answered in free text although the diagnosis was due");
                }

                Ok(AnalysisResponse {
                    stage: Stage::Questioning,
                    updated_history: appended(&request.history, &text),
                    content: text,
                    final_diagnosis: None,
                })
            }
            ModelReply::NoResponse => Err(DialogueError::ModelCall(
                "the model returned an empty reply".to_string(),
            )),
        }
    }
}

fn appended(history: &[DialogueTurn], assistant_content: &str) -> Vec<DialogueTurn> {
    let mut updated = history.to_vec();
    updated.push(DialogueTurn::assistant(assistant_content));
    updated
}
