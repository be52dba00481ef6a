use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::types::{CodeBlock, CodeBlockId};

/// Ids stay unique across registries and clears for the whole process.
static NEXT_BLOCK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Store of code blocks extracted from assistant responses.
///
/// Every registration creates a new entry, even for identical code. The
/// `registered_since_clear` counter starts at zero and is reset by
/// [`CodeBlockRegistry::clear`], so callers can tell when the first block of a
/// fresh display appears.
#[derive(Debug, Default)]
pub struct CodeBlockRegistry {
    blocks: Vec<CodeBlock>,
    registered_since_clear: usize,
}

impl CodeBlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        raw_code: impl Into<String>,
        language: impl Into<String>,
    ) -> CodeBlockId {
        let id = CodeBlockId::from_sequence(NEXT_BLOCK_SEQUENCE.fetch_add(1, Ordering::Relaxed));
        let block = CodeBlock {
            id: id.clone(),
            language: language.into(),
            raw_code: raw_code.into(),
        };
        debug!(block_id = %id, language = %block.language, "registered code block");
        self.blocks.push(block);
        self.registered_since_clear += 1;
        id
    }

    pub fn get(&self, id: &CodeBlockId) -> Option<&CodeBlock> {
        self.blocks.iter().find(|block| &block.id == id)
    }

    /// Drops a block registered by a response that was later discarded.
    pub fn remove(&mut self, id: &CodeBlockId) -> Option<CodeBlock> {
        let index = self.blocks.iter().position(|block| &block.id == id)?;
        self.registered_since_clear = self.registered_since_clear.saturating_sub(1);
        Some(self.blocks.remove(index))
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.registered_since_clear = 0;
    }

    pub fn registered_since_clear(&self) -> usize {
        self.registered_since_clear
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter()
    }

    pub fn latest(&self) -> Option<&CodeBlock> {
        self.blocks.last()
    }
}
