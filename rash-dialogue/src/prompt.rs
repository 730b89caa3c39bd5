use serde::{Deserialize, Serialize};

use crate::{
    error::{DialogueError, Result},
    message::{AnalysisRequest, DialogueTurn, PipelineMode, Role},
    stage::StagePlan,
};

const ROLE_DESCRIPTION: &str = "You are a professional AI Dermatology Differential Diagnosis Assistant. \
Your task is to analyze the user's skin condition based on the provided image or visual features and the dialogue history.";

const RULES: &str = "You MUST adhere strictly to the following rules:
1. If only the image (or visual features) is known and no answers were given yet, ask 2-3 clarifying questions.
2. Once the user has answered, you MUST call the function submit_diagnosis.
3. Never output a diagnosis as free text; always submit it with the submit_diagnosis tool.
4. Tool arguments must strictly follow the declared JSON schema.
5. CRITICAL: Do NOT provide medical advice. Always include a strong disclaimer.";

const NATIVE_FIRST_TURN: &str = "Please analyze this image and ask 2-3 necessary questions.";

const STRICT_FIRST_TURN: &str =
    "Please analyze the following visual features and ask 2-3 necessary questions:\n\n---\n";

/// One entry of the message list submitted to the reasoning model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub content: PromptContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl From<&DialogueTurn> for PromptTurn {
    fn from(turn: &DialogueTurn) -> Self {
        Self {
            role: turn.role,
            content: PromptContent::Text(turn.content.clone()),
        }
    }
}

pub fn system_directive(plan: &StagePlan) -> String {
    format!(
        "{}\n{}\nCurrent goal: {}",
        ROLE_DESCRIPTION, RULES, plan.directive
    )
}

/// Assemble the message list for one model call.
///
/// The system directive always comes first. A new conversation gets a single
/// user turn carrying either the image or the extracted visual features; an
/// ongoing one gets the caller's history replayed verbatim.
pub fn build(
    request: &AnalysisRequest,
    plan: &StagePlan,
    visual_features: Option<&str>,
) -> Result<Vec<PromptTurn>> {
    let mut turns = vec![PromptTurn {
        role: Role::System,
        content: PromptContent::Text(system_directive(plan)),
    }];

    if !request.history.is_empty() {
        turns.extend(request.history.iter().map(PromptTurn::from));
        return Ok(turns);
    }

    let parts = match request.mode {
        PipelineMode::NativeDirect => vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: request.image.data_url(),
                },
            },
            ContentPart::Text {
                text: NATIVE_FIRST_TURN.to_string(),
            },
        ],
        PipelineMode::StrictLocal => {
            let features = visual_features
                .filter(|f| !f.trim().is_empty())
                .ok_or(DialogueError::MissingVisualFeatures)?;
            vec![ContentPart::Text {
                text: format!("{}{}", STRICT_FIRST_TURN, features),
            }]
        }
    };

    turns.push(PromptTurn {
        role: Role::User,
        content: PromptContent::Parts(parts),
    });

    Ok(turns)
}
