use std::io::{self, Write};

use tracing::warn;
use unichat_core::{CodeBlockRegistry, RenderPlan, RenderSegment, Renderer};

/// Prints a streamed response to a terminal.
///
/// Finalized segments are written as soon as they appear; the pending tail
/// may still change, so it is only written once the response completes.
pub struct TerminalRenderer<W: Write> {
    writer: W,
    printed: usize,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, printed: 0 }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }

    fn write_segments(
        &mut self,
        segments: &[RenderSegment],
        blocks: &CodeBlockRegistry,
    ) -> io::Result<()> {
        for segment in segments {
            write!(self.writer, "{}", format_segment(segment, blocks))?;
        }
        self.writer.flush()
    }

    fn report(result: io::Result<()>) {
        if let Err(error) = result {
            warn!(%error, "stdout write failed");
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render_plan(&mut self, plan: &RenderPlan, blocks: &CodeBlockRegistry) {
        let finalized = plan.finalized();
        if finalized.len() <= self.printed {
            return;
        }
        let fresh = finalized[self.printed..].to_vec();
        self.printed = finalized.len();
        let result = self.write_segments(&fresh, blocks);
        Self::report(result);
    }

    fn render_complete(&mut self, plan: &RenderPlan, blocks: &CodeBlockRegistry) {
        let start = self.printed.min(plan.segments.len());
        let rest = plan.segments[start..].to_vec();
        self.printed = 0;
        let result = self
            .write_segments(&rest, blocks)
            .and_then(|_| writeln!(self.writer))
            .and_then(|_| self.writer.flush());
        Self::report(result);
    }

    fn render_failure(&mut self, message: &str) {
        self.printed = 0;
        let result = writeln!(self.writer, "{message}").and_then(|_| self.writer.flush());
        Self::report(result);
    }
}

pub fn format_segment(segment: &RenderSegment, blocks: &CodeBlockRegistry) -> String {
    match segment {
        RenderSegment::Text { text } => text.clone(),
        RenderSegment::Image { url } => format!("\n[image] {url}\n"),
        RenderSegment::CodeReference { block_id, language } => match blocks.get(block_id) {
            Some(block) => format!(
                "\n```{language} ({block_id})\n{}\n```\n",
                block.raw_code
            ),
            None => format!("\n[code {block_id} unavailable]\n"),
        },
    }
}
