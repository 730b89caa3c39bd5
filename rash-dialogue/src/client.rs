use async_trait::async_trait;
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{message::ImagePayload, prompt::PromptTurn};

/// Turns an image into a short textual report of its visual characteristics.
///
/// Implementations own whatever model they load; the orchestrator only holds
/// a shared reference and must be able to call it from concurrent requests.
#[async_trait]
pub trait VisionFeatureExtractor: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> anyhow::Result<String>;
}

/// A single completion call against a tool-calling reasoning model.
#[async_trait]
pub trait ReasoningModelClient: Send + Sync {
    async fn complete(
        &self,
        turns: &[PromptTurn],
        tools: &[ToolDefinition],
    ) -> anyhow::Result<CompletionReply>;
}

/// A tool call as the model emitted it. `arguments` is unvalidated JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
}

/// Raw assistant message returned by a [`ReasoningModelClient`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl CompletionReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolInvocation {
                name: name.into(),
                arguments: arguments.into(),
            }],
        }
    }
}

/// What the model actually did in its reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    FreeText(String),
    ToolInvocation { name: String, arguments: String },
    NoResponse,
}

impl From<CompletionReply> for ModelReply {
    /// A tool call wins over any accompanying text. Only the first one counts.
    fn from(reply: CompletionReply) -> Self {
        let mut calls = reply.tool_calls.into_iter();
        if let Some(first) = calls.next() {
            let ignored = calls.count();
            if ignored > 0 {
                warn!(
                    tool = %first.name,
                    ignored,
                    "Model returned several tool invocations, only the first is used"
                );
            }
            return ModelReply::ToolInvocation {
                name: first.name,
                arguments: first.arguments,
            };
        }

        match reply.content {
            Some(text) if !text.trim().is_empty() => ModelReply::FreeText(text),
            _ => ModelReply::NoResponse,
        }
    }
}
