use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use rash_dialogue::{CompletionReply, PromptTurn, ReasoningModelClient, ToolInvocation};
use reqwest::Client;
use rig::completion::ToolDefinition;
use serde_json::{Value, json};
use tracing::{debug, info};

/// OpenAI-compatible chat-completions client bound to one model.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn post_chat(&self, payload: &Value) -> anyhow::Result<Value> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .context("request to chat completions endpoint failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API request failed: {} {}", status, body.trim()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReasoningModelClient for OpenRouterClient {
    async fn complete(
        &self,
        turns: &[PromptTurn],
        tools: &[ToolDefinition],
    ) -> anyhow::Result<CompletionReply> {
        info!(model = %self.model, turns = turns.len(), "Calling reasoning model");

        let payload = build_payload(&self.model, turns, tools)?;
        let response_json = self.post_chat(&payload).await?;
        let reply = parse_completion(&response_json)?;

        debug!(
            has_text = reply.content.is_some(),
            tool_calls = reply.tool_calls.len(),
            "Reasoning model replied"
        );
        Ok(reply)
    }
}

/// Request body with the tools attached and tool use left to the model.
pub fn build_payload(
    model: &str,
    turns: &[PromptTurn],
    tools: &[ToolDefinition],
) -> anyhow::Result<Value> {
    let tools: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect();

    Ok(json!({
        "model": model,
        "messages": serde_json::to_value(turns)?,
        "tools": tools,
        "tool_choice": "auto",
    }))
}

/// Extract the assistant message of the first choice.
pub fn parse_completion(response_json: &Value) -> anyhow::Result<CompletionReply> {
    let message = response_json["choices"][0]
        .get("message")
        .ok_or_else(|| anyhow!("Invalid response format from LLM: no message in first choice"))?;

    let content = message["content"].as_str().map(str::to_string);

    let tool_calls = match message.get("tool_calls").and_then(Value::as_array) {
        Some(calls) => calls.iter().map(parse_tool_call).collect(),
        None => Vec::new(),
    };

    Ok(CompletionReply {
        content,
        tool_calls,
    })
}

/// A call without a function name is kept with an empty name; the orchestrator
/// reports it as a diagnosis-extraction failure.
fn parse_tool_call(call: &Value) -> ToolInvocation {
    let function = &call["function"];
    let name = function["name"].as_str().unwrap_or_default();

    // Some providers inline the arguments as an object instead of a JSON string
    let arguments = match &function["arguments"] {
        Value::String(raw) => raw.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    ToolInvocation {
        name: name.to_string(),
        arguments,
    }
}
