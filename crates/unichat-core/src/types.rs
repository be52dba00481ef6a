use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeBlockId(String);

impl CodeBlockId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("code-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CodeBlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CodeBlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: CodeBlockId,
    pub language: String,
    #[serde(rename = "rawCode")]
    pub raw_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderSegment {
    Text {
        text: String,
    },
    CodeReference {
        #[serde(rename = "blockId")]
        block_id: CodeBlockId,
        language: String,
    },
    Image {
        url: String,
    },
}

impl RenderSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Rendering plan for the response accumulated so far.
///
/// The first `finalized_len` segments are final and will appear unchanged in
/// every later plan of the same response; the rest is the pending tail.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPlan {
    pub segments: Vec<RenderSegment>,
    pub finalized_len: usize,
}

impl RenderPlan {
    pub fn finalized(&self) -> &[RenderSegment] {
        &self.segments[..self.finalized_len.min(self.segments.len())]
    }

    pub fn pending(&self) -> &[RenderSegment] {
        &self.segments[self.finalized_len.min(self.segments.len())..]
    }

    pub fn code_references(&self) -> impl Iterator<Item = &CodeBlockId> {
        self.segments.iter().filter_map(|segment| match segment {
            RenderSegment::CodeReference { block_id, .. } => Some(block_id),
            _ => None,
        })
    }
}

/// Per-request state machine of the streaming orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
    /// A newer request superseded this one before it finished.
    Cancelled,
}
