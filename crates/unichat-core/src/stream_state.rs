use crate::registry::CodeBlockRegistry;
use crate::scanner::{ContentScanner, OpenRegion, ScanPass, ScannedSegment};
use crate::types::{CodeBlockId, RenderPlan, RenderSegment};

/// A code block that a commit registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredBlock {
    pub id: CodeBlockId,
    /// True when this is the first block since the registry was cleared.
    pub first_since_clear: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub plan: RenderPlan,
    pub registered: Vec<RegisteredBlock>,
}

/// Scanning state for one in-flight response.
///
/// Text before `last_scan_position` has already been turned into finalized
/// segments and is never scanned again, so every closed region is registered
/// exactly once.
#[derive(Debug, Default)]
pub struct StreamState {
    accumulated: String,
    last_scan_position: usize,
    open_region: Option<OpenRegion>,
    finalized: Vec<RenderSegment>,
    pending: Vec<RenderSegment>,
    registered: Vec<CodeBlockId>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, text: &str) {
        self.accumulated.push_str(text);
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    pub fn last_scan_position(&self) -> usize {
        self.last_scan_position
    }

    pub fn open_region(&self) -> Option<OpenRegion> {
        self.open_region
    }

    /// Ids registered by this response so far.
    pub fn registered_blocks(&self) -> &[CodeBlockId] {
        &self.registered
    }

    /// Scans the unfinalized part of the buffer without touching any state.
    pub fn scan(&self, scanner: &ContentScanner) -> ScanPass {
        scanner.scan(&self.accumulated, self.last_scan_position)
    }

    /// Applies a pass produced by [`StreamState::scan`] over the current
    /// buffer, registering the code regions it closed.
    pub fn commit(&mut self, pass: ScanPass, registry: &mut CodeBlockRegistry) -> CommitOutcome {
        let mut registered = Vec::new();
        for segment in pass.finalized {
            let segment = match segment {
                ScannedSegment::Text(text) => RenderSegment::Text { text },
                ScannedSegment::Image(url) => RenderSegment::Image { url },
                ScannedSegment::Code { code, language } => {
                    let id = registry.register(code, language.clone());
                    registered.push(RegisteredBlock {
                        id: id.clone(),
                        first_since_clear: registry.registered_since_clear() == 1,
                    });
                    self.registered.push(id.clone());
                    RenderSegment::CodeReference {
                        block_id: id,
                        language,
                    }
                }
            };
            self.finalized.push(segment);
        }

        self.pending = pass
            .pending
            .into_iter()
            .map(|segment| match segment {
                ScannedSegment::Text(text) => RenderSegment::Text { text },
                ScannedSegment::Image(url) => RenderSegment::Image { url },
                // The scanner only closes regions into the finalized list.
                ScannedSegment::Code { code, .. } => RenderSegment::Text { text: code },
            })
            .collect();
        self.last_scan_position = pass.safe_prefix;
        self.open_region = pass.open_region;

        CommitOutcome {
            plan: self.plan(),
            registered,
        }
    }

    /// Appends decoded text, scans and commits in one step.
    pub fn ingest(
        &mut self,
        text: &str,
        scanner: &ContentScanner,
        registry: &mut CodeBlockRegistry,
    ) -> CommitOutcome {
        self.push_text(text);
        let pass = self.scan(scanner);
        self.commit(pass, registry)
    }

    pub fn plan(&self) -> RenderPlan {
        let mut segments = self.finalized.clone();
        segments.extend(self.pending.iter().cloned());
        RenderPlan {
            segments,
            finalized_len: self.finalized.len(),
        }
    }

    /// Removes everything this response registered, for superseded streams.
    pub fn discard(self, registry: &mut CodeBlockRegistry) {
        for id in &self.registered {
            registry.remove(id);
        }
    }
}
