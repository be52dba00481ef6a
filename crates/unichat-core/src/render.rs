use crate::registry::CodeBlockRegistry;
use crate::types::{CodeBlock, RenderPlan, RequestPhase};

/// Shown in place of a response when the exchange fails.
pub const FAILURE_MESSAGE: &str = "Sorry, there was an error processing your request.";

/// Display side of a chat session.
///
/// Plans always describe the whole response so far. Implementations that
/// draw incrementally should only emit segments past what they already drew
/// from [`RenderPlan::finalized`].
pub trait Renderer {
    /// Called after every received chunk.
    fn render_plan(&mut self, plan: &RenderPlan, blocks: &CodeBlockRegistry);

    /// Called once per newly registered code block, before the plan that
    /// references it.
    fn code_block_registered(&mut self, _block: &CodeBlock, _first_since_clear: bool) {}

    /// Called once when the response has ended.
    fn render_complete(&mut self, plan: &RenderPlan, blocks: &CodeBlockRegistry) {
        self.render_plan(plan, blocks);
    }

    fn render_failure(&mut self, message: &str);

    /// Called on every phase transition of an exchange, e.g. to show a
    /// typing indicator while `Sending`.
    fn phase_changed(&mut self, _phase: RequestPhase) {}
}
