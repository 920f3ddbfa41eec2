//! Structured (JSON) encoding of a channel response.
//!
//! ```json
//! {
//!   "analysis": "...",
//!   "commentary": "...",
//!   "final": "...",
//!   "metadata": {
//!     "continue": true,
//!     "reason": "...",
//!     "progress": { "current_step": 1, "total_steps": 3 },
//!     "tool_calls": [{ "id": "call_1", "tool": "list_directory", "parameters": { "path": "." } }]
//!   }
//! }
//! ```
//!
//! The lenient shapes also accept a top-level `continuation` object
//! (`{"status": "CONTINUE", "reason": ..., "progress": ...}`), `name` for
//! `tool` and `arguments` for `parameters`.

use serde::{Deserialize, Serialize};
use swarmline_core::{
    ChannelResponse, Continuation, ContinuationDecision, ProtocolError, Progress, ToolCall,
};

// --- Lenient inbound shapes ---

#[derive(Debug, Deserialize)]
pub(crate) struct LenientResponse {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    commentary: Option<String>,
    #[serde(default, rename = "final")]
    final_text: Option<String>,
    #[serde(default)]
    metadata: Option<LenientMetadata>,
    #[serde(default)]
    continuation: Option<LenientContinuation>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LenientMetadata {
    #[serde(default, rename = "continue")]
    continue_flag: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    progress: Option<Progress>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LenientContinuation {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    progress: Option<Progress>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(alias = "name")]
    tool: String,
    #[serde(default, alias = "arguments")]
    parameters: serde_json::Value,
}

impl WireToolCall {
    fn into_call(self) -> ToolCall {
        let parameters = if self.parameters.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.parameters
        };
        match self.id {
            Some(id) => ToolCall {
                id,
                name: self.tool,
                arguments: parameters,
            },
            None => ToolCall::new(self.tool, parameters),
        }
    }
}

impl LenientMetadata {
    /// Decision carried by a metadata object, if it holds a `continue` flag.
    pub(crate) fn decision(&self) -> Option<ContinuationDecision> {
        let flag = self.continue_flag?;
        let kind = if flag {
            Continuation::Continue
        } else {
            Continuation::Terminate
        };
        Some(ContinuationDecision {
            kind,
            reason: self.reason.clone().unwrap_or_default(),
            progress: self.progress.clone(),
        })
    }
}

impl LenientContinuation {
    pub(crate) fn decision(&self) -> Option<ContinuationDecision> {
        let kind = Continuation::parse(&self.status)?;
        Some(ContinuationDecision {
            kind,
            reason: self.reason.clone().unwrap_or_default(),
            progress: self.progress.clone(),
        })
    }
}

/// Parse a continuation object in any of the accepted shapes.
pub(crate) fn decision_from_value(value: serde_json::Value) -> Option<ContinuationDecision> {
    if value.get("status").is_some() {
        serde_json::from_value::<LenientContinuation>(value)
            .ok()?
            .decision()
    } else {
        serde_json::from_value::<LenientMetadata>(value)
            .ok()?
            .decision()
    }
}

/// Try to read `json` as a structured channel response.
///
/// Returns `None` when the text is not a JSON object or names none of the
/// channel fields, so the caller can fall through to the next layer.
pub(crate) fn decode_structured(json: &str) -> Option<ChannelResponse> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let object = value.as_object()?;
    if !["analysis", "commentary", "final"]
        .iter()
        .any(|k| object.contains_key(*k))
    {
        return None;
    }

    let wire: LenientResponse = serde_json::from_value(value).ok()?;
    let metadata = wire.metadata.unwrap_or_default();

    let decision = metadata
        .decision()
        .or_else(|| wire.continuation.as_ref().and_then(|c| c.decision()))
        .unwrap_or_default();

    Some(ChannelResponse {
        analysis: wire.analysis.unwrap_or_default(),
        commentary: wire.commentary.unwrap_or_default(),
        final_text: wire.final_text.unwrap_or_default(),
        tool_calls: metadata
            .tool_calls
            .into_iter()
            .map(WireToolCall::into_call)
            .collect(),
        decision,
    })
}

/// Extract `{"tool": ..., "parameters": ...}` objects embedded in free text.
pub(crate) fn extract_tool_calls(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut offset = 0;

    while let Some(pos) = text[offset..].find('{') {
        let start = offset + pos;
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                if let Some(call) = tool_call_from_value(value) {
                    calls.push(call);
                }
                offset = start + consumed.max(1);
            }
            _ => offset = start + 1,
        }
    }

    calls
}

fn tool_call_from_value(value: serde_json::Value) -> Option<ToolCall> {
    let object = value.as_object()?;
    // OpenAI-style {"function": {"name": ..., "arguments": ...}}
    if let Some(function) = object.get("function").filter(|f| f.is_object()) {
        return serde_json::from_value::<WireToolCall>(function.clone())
            .ok()
            .map(WireToolCall::into_call);
    }
    if !object.contains_key("tool") {
        return None;
    }
    serde_json::from_value::<WireToolCall>(value)
        .ok()
        .map(WireToolCall::into_call)
}

// --- Outbound / strict shapes ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictResponse {
    analysis: String,
    commentary: String,
    #[serde(rename = "final")]
    final_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<StrictMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictMetadata {
    #[serde(rename = "continue")]
    continue_flag: bool,
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

impl From<&ChannelResponse> for StrictResponse {
    fn from(response: &ChannelResponse) -> Self {
        Self {
            analysis: response.analysis.clone(),
            commentary: response.commentary.clone(),
            final_text: response.final_text.clone(),
            metadata: Some(StrictMetadata {
                continue_flag: response.decision.wants_continue(),
                reason: response.decision.reason.clone(),
                progress: response.decision.progress.clone(),
                tool_calls: response
                    .tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: Some(c.id.clone()),
                        tool: c.name.clone(),
                        parameters: c.arguments.clone(),
                    })
                    .collect(),
            }),
        }
    }
}

impl From<StrictResponse> for ChannelResponse {
    fn from(strict: StrictResponse) -> Self {
        let (decision, tool_calls) = match strict.metadata {
            Some(meta) => (
                ContinuationDecision {
                    kind: if meta.continue_flag {
                        Continuation::Continue
                    } else {
                        Continuation::Terminate
                    },
                    reason: meta.reason,
                    progress: meta.progress,
                },
                meta.tool_calls.into_iter().map(WireToolCall::into_call).collect(),
            ),
            None => (ContinuationDecision::default(), Vec::new()),
        };
        ChannelResponse {
            analysis: strict.analysis,
            commentary: strict.commentary,
            final_text: strict.final_text,
            tool_calls,
            decision,
        }
    }
}

pub(crate) fn encode(response: &ChannelResponse) -> String {
    // Serializing plain strings, bools and JSON values cannot fail.
    serde_json::to_string_pretty(&StrictResponse::from(response)).unwrap_or_default()
}

pub(crate) fn decode_strict(raw: &str) -> Result<ChannelResponse, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let strict: StrictResponse =
        serde_json::from_value(value).map_err(|e| ProtocolError::SchemaViolation(e.to_string()))?;
    Ok(strict.into())
}
