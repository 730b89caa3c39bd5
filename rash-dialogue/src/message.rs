use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DISCLAIMER: &str =
    "This is not a medical diagnosis. Please consult a qualified physician.";

/// Who authored a dialogue turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single turn of the caller-owned dialogue history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: Role,
    pub content: String,
}

impl DialogueTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// How the image reaches the reasoning model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// The image is captioned by the vision extractor and only the resulting
    /// text is forwarded.
    StrictLocal,
    /// The raw image is forwarded to the reasoning model.
    #[default]
    #[serde(alias = "native_gpt4o")]
    NativeDirect,
}

/// Base64 image as supplied by the caller, optionally with a `data:` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// URL form accepted by multimodal chat APIs.
    pub fn data_url(&self) -> String {
        if self.0.starts_with("data:") {
            self.0.clone()
        } else {
            format!("data:image/jpeg;base64,{}", self.0)
        }
    }

    /// Raw image bytes, with any `data:<mime>;base64,` header stripped.
    ///
    /// Line breaks and other whitespace inside the payload are ignored, so
    /// wrapped output of `base64` decodes as well.
    pub fn decode_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let encoded = match self.0.split_once(',') {
            Some((_, body)) => body,
            None => self.0.as_str(),
        };
        let compact: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        Ok(STANDARD.decode(compact)?)
    }
}

/// Input of one dialogue call. An empty `history` starts a new conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(rename = "image_base64", alias = "image")]
    pub image: ImagePayload,
    #[serde(rename = "pipeline_mode", alias = "mode", default)]
    pub mode: PipelineMode,
    #[serde(rename = "conversation_history", alias = "history", default)]
    pub history: Vec<DialogueTurn>,
}

/// Structured differential diagnosis submitted through the `submit_diagnosis` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub diagnosis_options: Vec<String>,
    pub key_differences: String,
    pub symptoms_to_check: Vec<String>,
    pub diagnostic_methods: Vec<String>,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

fn default_disclaimer() -> String {
    DEFAULT_DISCLAIMER.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Questioning,
    Diagnosis,
}

/// Output of one dialogue call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub stage: Stage,
    pub content: String,
    pub final_diagnosis: Option<DiagnosisResult>,
    pub updated_history: Vec<DialogueTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{
                "image_base64": "aGVsbG8=",
                "pipeline_mode": "native_gpt4o",
                "conversation_history": [{"role": "assistant", "content": "Does it itch?"}]
            }"#,
        )
        .unwrap();

        assert_eq!(request.mode, PipelineMode::NativeDirect);
        assert_eq!(request.history, vec![DialogueTurn::assistant("Does it itch?")]);
    }

    #[test]
    fn test_request_defaults() {
        let request: AnalysisRequest = serde_json::from_str(r#"{"image": "aGVsbG8="}"#).unwrap();

        assert_eq!(request.mode, PipelineMode::NativeDirect);
        assert!(request.history.is_empty());
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = serde_json::from_str::<DialogueTurn>(r#"{"role": "tool", "content": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_image_payload_data_url() {
        let bare = ImagePayload::new("aGVsbG8=");
        assert_eq!(bare.data_url(), "data:image/jpeg;base64,aGVsbG8=");

        let prefixed = ImagePayload::new("data:image/png;base64,aGVsbG8=");
        assert_eq!(prefixed.data_url(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_image_payload_decode_strips_header() {
        let prefixed = ImagePayload::new("data:image/png;base64,aGVsbG8=");
        assert_eq!(prefixed.decode_bytes().unwrap(), b"hello");

        let garbage = ImagePayload::new("not base64 at all!");
        assert!(garbage.decode_bytes().is_err());
    }

    #[test]
    fn test_image_payload_decode_line_wrapped() {
        let raw: Vec<u8> = (0u8..=200).collect();
        let flat = STANDARD.encode(&raw);
        assert!(flat.len() > 152);

        let wrapped = format!("{}\n{}\r\n{}\n", &flat[..76], &flat[76..152], &flat[152..]);
        assert_eq!(ImagePayload::new(wrapped.clone()).decode_bytes().unwrap(), raw);

        let prefixed = format!("data:image/jpeg;base64,{}", wrapped);
        assert_eq!(ImagePayload::new(prefixed).decode_bytes().unwrap(), raw);
    }

    #[test]
    fn test_response_serializes_missing_diagnosis_as_null() {
        let response = AnalysisResponse {
            stage: Stage::Questioning,
            content: "Does it itch?".to_string(),
            final_diagnosis: None,
            updated_history: vec![DialogueTurn::assistant("Does it itch?")],
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["stage"], "questioning");
        assert!(value["final_diagnosis"].is_null());
        assert_eq!(value["updated_history"][0]["role"], "assistant");
    }
}
