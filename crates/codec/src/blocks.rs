//! Delimited-block encoding.
//!
//! ```text
//! [ANALYSIS] private reasoning [/ANALYSIS]
//! [COMMENTARY] {"tool": "list_directory", "parameters": {"path": "."}}
//! [FINAL] Found 3 files.
//! [CONTINUATION] CONTINUE: false
//! ```
//!
//! Closing tags are optional; a section runs until the next marker. The
//! XML-ish forms `<analysis>`, `<thinking>`, `<commentary>`, `<tool_call>`,
//! `<final>` and `<continuation>` are accepted as well.

use regex_lite::Regex;
use std::sync::LazyLock;
use swarmline_core::{Continuation, ContinuationDecision};

use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Analysis,
    Commentary,
    Final,
    Continuation,
}

impl Section {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "analysis" | "thinking" => Some(Self::Analysis),
            "commentary" | "tool_call" | "tool_calls" => Some(Self::Commentary),
            "final" => Some(Self::Final),
            "continuation" => Some(Self::Continuation),
            _ => None,
        }
    }
}

/// Raw section text pulled out of a delimited response.
#[derive(Debug, Default)]
pub(crate) struct Blocks {
    pub analysis: String,
    pub commentary: String,
    pub final_text: String,
    pub continuation: Option<String>,
}

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(/?)(analysis|commentary|final|continuation)\]|<(/?)(analysis|thinking|commentary|tool_calls?|final|continuation)>",
    )
    .expect("marker regex is valid")
});

static FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:continue|continuation|status)\s*[:=]\s*(true|yes|1|false|no|0|continue|terminate)\b",
    )
    .expect("flag regex is valid")
});

static REASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*reason\s*[:=]\s*(.+)$").expect("reason regex is valid"));

/// Split `raw` into sections. Returns `None` if no opening marker exists.
pub(crate) fn scan(raw: &str) -> Option<Blocks> {
    let mut blocks = Blocks::default();
    let mut current: Option<(Section, usize)> = None;
    let mut found = false;

    for caps in MARKER.captures_iter(raw) {
        let whole = caps.get(0)?;
        let (closing, tag) = match (caps.get(2), caps.get(4)) {
            (Some(tag), _) => (caps.get(1).is_some_and(|m| !m.is_empty()), tag.as_str()),
            (None, Some(tag)) => (caps.get(3).is_some_and(|m| !m.is_empty()), tag.as_str()),
            (None, None) => continue,
        };

        if let Some((section, start)) = current.take() {
            push(&mut blocks, section, &raw[start..whole.start()]);
        }

        if !closing && let Some(section) = Section::from_tag(tag) {
            found = true;
            current = Some((section, whole.end()));
        }
    }

    if let Some((section, start)) = current {
        push(&mut blocks, section, &raw[start..]);
    }

    found.then_some(blocks)
}

/// Read a `[CONTINUATION]` block: a JSON object or `CONTINUE: true|false`.
pub(crate) fn decision(block: &str) -> Option<ContinuationDecision> {
    let block = block.trim();
    if block.starts_with('{')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(block)
    {
        return wire::decision_from_value(value);
    }

    let caps = FLAG.captures(block)?;
    let kind = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "continue" => Continuation::Continue,
        _ => Continuation::Terminate,
    };
    let reason = REASON
        .captures(block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(ContinuationDecision {
        kind,
        reason,
        progress: None,
    })
}

fn push(blocks: &mut Blocks, section: Section, text: &str) {
    let text = text.trim();
    let slot = match section {
        Section::Analysis => &mut blocks.analysis,
        Section::Commentary => &mut blocks.commentary,
        Section::Final => &mut blocks.final_text,
        Section::Continuation => {
            if !text.is_empty() {
                blocks.continuation = Some(text.to_string());
            }
            return;
        }
    };
    if text.is_empty() {
        return;
    }
    if !slot.is_empty() {
        slot.push('\n');
    }
    slot.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bracket_sections_without_closers() {
        let raw = "[ANALYSIS]\nthink\n[COMMENTARY]\nnote\n[FINAL]\nanswer";
        let blocks = scan(raw).unwrap();
        assert_eq!(blocks.analysis, "think");
        assert_eq!(blocks.commentary, "note");
        assert_eq!(blocks.final_text, "answer");
        assert!(blocks.continuation.is_none());
    }

    #[test]
    fn honours_closing_tags_and_ignores_text_between() {
        let raw = "[ANALYSIS]a[/ANALYSIS] stray [FINAL]f[/FINAL]";
        let blocks = scan(raw).unwrap();
        assert_eq!(blocks.analysis, "a");
        assert_eq!(blocks.final_text, "f");
    }

    #[test]
    fn accepts_xml_forms() {
        let raw = "<thinking>hmm</thinking><final>done</final>";
        let blocks = scan(raw).unwrap();
        assert_eq!(blocks.analysis, "hmm");
        assert_eq!(blocks.final_text, "done");
    }

    #[test]
    fn no_markers_is_none() {
        assert!(scan("Hello").is_none());
        assert!(scan("[/FINAL] only a closer").is_none());
    }

    #[test]
    fn continuation_flag_forms() {
        let d = decision("CONTINUE: true\nREASON: two more files").unwrap();
        assert_eq!(d.kind, Continuation::Continue);
        assert_eq!(d.reason, "two more files");

        let d = decision("continue = no").unwrap();
        assert_eq!(d.kind, Continuation::Terminate);

        let d = decision(r#"{"continue": true, "reason": "json form"}"#).unwrap();
        assert_eq!(d.reason, "json form");

        assert!(decision("whatever").is_none());
    }
}
