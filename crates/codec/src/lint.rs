//! Non-fatal heuristics over a decoded response.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use swarmline_core::ChannelResponse;

/// Analysis that opens like a reply to the user.
static USER_FACING_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:great|certainly|okay|ok|sure|hello|hi|hey|of course|absolutely|thanks|thank you)\b",
    )
    .expect("opener regex is valid")
});

/// Analysis that speaks to the user directly.
static USER_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i hope this helps|let me know if|as you requested|you asked|dear user|happy to help)\b")
        .expect("address regex is valid")
});

/// Prose describing a tool call instead of emitting one.
static TOOL_AS_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:call|calling|use|using|invoke|invoking|run|running|execute|executing)\s+(?:the\s+)?`?[a-z][a-z0-9_]*`?\s+(?:tool|function)\b|\btool_call\b",
    )
    .expect("tool regex is valid")
});

/// A protocol deviation that does not prevent decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum CodecWarning {
    /// `final` is longer than the caller's line budget.
    FinalTooLong { lines: usize, budget: usize },
    /// `analysis` reads like it was written for the user.
    AnalysisLooksUserFacing,
    /// `commentary` describes a tool call in prose but none was structured.
    ToolCallAsText,
}

impl std::fmt::Display for CodecWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FinalTooLong { lines, budget } => {
                write!(f, "final channel has {lines} lines (budget {budget})")
            }
            Self::AnalysisLooksUserFacing => {
                f.write_str("analysis channel appears to address the user")
            }
            Self::ToolCallAsText => {
                f.write_str("commentary describes a tool call as text instead of a structured call")
            }
        }
    }
}

pub(crate) fn check(response: &ChannelResponse, line_budget: usize) -> Vec<CodecWarning> {
    let mut warnings = Vec::new();

    let lines = response
        .final_text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count();
    if lines > line_budget {
        warnings.push(CodecWarning::FinalTooLong {
            lines,
            budget: line_budget,
        });
    }

    if !response.analysis.is_empty()
        && (USER_FACING_OPENER.is_match(&response.analysis)
            || USER_ADDRESS.is_match(&response.analysis))
    {
        warnings.push(CodecWarning::AnalysisLooksUserFacing);
    }

    if response.tool_calls.is_empty() && TOOL_AS_TEXT.is_match(&response.commentary) {
        warnings.push(CodecWarning::ToolCallAsText);
    }

    warnings
}
