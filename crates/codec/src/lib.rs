//! Channel protocol codec for Swarmline.
//!
//! Turns raw, untrusted model output into a validated [`ChannelResponse`].
//! Decoding is layered and lenient:
//!
//! 1. **Structured** — one JSON object, optionally inside a ```` ```json ````
//!    fence, with `analysis` / `commentary` / `final` and optional `metadata`.
//! 2. **Delimited** — `[ANALYSIS]` / `[COMMENTARY]` / `[FINAL]` sections with
//!    an optional `[CONTINUATION]` block. Tool-call JSON found in commentary is
//!    lifted into structured calls.
//! 3. **Plain text** — the whole output becomes `final`.
//!
//! Output without a continuation signal always decodes to TERMINATE.
//! Deviations that do not block decoding are reported as [`CodecWarning`]s.

mod blocks;
mod lint;
mod wire;

pub use lint::CodecWarning;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use swarmline_core::{ChannelResponse, ContinuationDecision, ProtocolError};
use tracing::debug;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*\})\s*```").expect("fence regex is valid")
});

/// Which decoding layer produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Structured,
    Delimited,
    PlainText,
}

/// A decoded model turn plus what the decoder noticed along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub response: ChannelResponse,
    pub encoding: Encoding,
    pub warnings: Vec<CodecWarning>,
}

/// Line budgets applied to the `final` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBudget {
    /// Budget for ordinary turns
    pub normal: usize,
    /// Budget when the caller explicitly asked for detail
    pub detailed: usize,
}

impl Default for LineBudget {
    fn default() -> Self {
        Self {
            normal: 4,
            detailed: 40,
        }
    }
}

/// Stateless codec configured with line budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCodec {
    budget: LineBudget,
}

impl ChannelCodec {
    pub fn new(budget: LineBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> LineBudget {
        self.budget
    }

    /// Decode raw output into channels. Never fails; empty input yields an
    /// empty response that terminates.
    pub fn parse(&self, raw: &str) -> ChannelResponse {
        decode_layers(raw).0
    }

    /// Decode raw output, rejecting empty output and collecting warnings
    /// against the ordinary line budget.
    pub fn decode(&self, raw: &str) -> Result<Decoded, ProtocolError> {
        self.decode_with_budget(raw, self.budget.normal)
    }

    /// Like [`decode`](Self::decode), using the detailed line budget.
    pub fn decode_detailed(&self, raw: &str) -> Result<Decoded, ProtocolError> {
        self.decode_with_budget(raw, self.budget.detailed)
    }

    fn decode_with_budget(&self, raw: &str, line_budget: usize) -> Result<Decoded, ProtocolError> {
        if raw.trim().is_empty() {
            return Err(ProtocolError::EmptyOutput);
        }

        let (response, encoding) = decode_layers(raw);
        let warnings = lint::check(&response, line_budget);

        debug!(
            encoding = ?encoding,
            tool_calls = response.tool_calls.len(),
            continuation = %response.decision.kind,
            warnings = warnings.len(),
            "Decoded model output"
        );

        Ok(Decoded {
            response,
            encoding,
            warnings,
        })
    }

    /// Encode a response in the structured encoding.
    pub fn serialize(&self, response: &ChannelResponse) -> String {
        wire::encode(response)
    }

    /// Strictly validate structured output: unknown top-level or metadata
    /// fields and missing channel fields are schema violations.
    pub fn validate_strict(&self, raw: &str) -> Result<ChannelResponse, ProtocolError> {
        wire::decode_strict(raw)
    }
}

/// Decode with the default codec.
pub fn parse(raw: &str) -> ChannelResponse {
    ChannelCodec::default().parse(raw)
}

/// Encode with the default codec.
pub fn serialize(response: &ChannelResponse) -> String {
    ChannelCodec::default().serialize(response)
}

fn decode_layers(raw: &str) -> (ChannelResponse, Encoding) {
    let trimmed = raw.trim();

    // Layer 1: structured
    let json_candidate = if trimmed.starts_with('{') {
        Some(trimmed)
    } else {
        JSON_FENCE
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    };
    if let Some(response) = json_candidate.and_then(wire::decode_structured) {
        return (response, Encoding::Structured);
    }

    // Layer 2: delimited blocks
    if let Some(found) = blocks::scan(raw) {
        let tool_calls = wire::extract_tool_calls(&found.commentary);
        let decision = found
            .continuation
            .as_deref()
            .and_then(blocks::decision)
            .unwrap_or_default();
        let response = ChannelResponse {
            analysis: found.analysis,
            commentary: found.commentary,
            final_text: found.final_text,
            tool_calls,
            decision,
        };
        return (response, Encoding::Delimited);
    }

    // A bare tool-call object with no channels around it
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        let tool_calls = wire::extract_tool_calls(trimmed);
        if !tool_calls.is_empty() {
            let response = ChannelResponse {
                commentary: trimmed.to_string(),
                tool_calls,
                ..Default::default()
            };
            return (response, Encoding::PlainText);
        }
    }

    // Layer 3: plain text
    let response = ChannelResponse {
        final_text: trimmed.to_string(),
        decision: ContinuationDecision::default(),
        ..Default::default()
    };
    (response, Encoding::PlainText)
}
