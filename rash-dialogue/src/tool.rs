use rig::completion::ToolDefinition;
use serde_json::json;

use crate::{
    error::{DialogueError, Result},
    message::{DEFAULT_DISCLAIMER, DiagnosisResult},
};

pub const SUBMIT_DIAGNOSIS: &str = "submit_diagnosis";

/// The `submit_diagnosis` capability offered to the reasoning model on every call.
///
/// Its parameters are exactly the [`DiagnosisResult`] shape.
pub fn diagnosis_tool() -> ToolDefinition {
    ToolDefinition {
        name: SUBMIT_DIAGNOSIS.to_string(),
        description: "Use this function when you are ready to give the final differential \
                      diagnosis and recommendations."
            .to_string(),
        parameters: json!({
            "type": "object",
            "required": [
                "diagnosis_options",
                "key_differences",
                "symptoms_to_check",
                "diagnostic_methods"
            ],
            "properties": {
                "diagnosis_options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "2-3 possible diagnoses"
                },
                "key_differences": {
                    "type": "string",
                    "description": "Key differences between the candidate diagnoses"
                },
                "symptoms_to_check": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Symptoms the patient should clarify"
                },
                "diagnostic_methods": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Recommended diagnostic methods"
                },
                "disclaimer": {
                    "type": "string",
                    "description": "Mandatory disclaimer",
                    "default": DEFAULT_DISCLAIMER
                }
            }
        }),
    }
}

/// Validate and deserialize the raw argument payload of a `submit_diagnosis` call.
pub fn parse_diagnosis(raw_arguments: &str) -> Result<DiagnosisResult> {
    serde_json::from_str::<DiagnosisResult>(raw_arguments)
        .map_err(|e| DialogueError::DiagnosisExtraction(e.to_string()))
}
