//! Best-effort speech side channel.

use std::sync::OnceLock;

use regex::Regex;

/// Plays cleaned response text aloud. Failures are the sink's own concern.
pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str);
    fn cancel(&self);
}

struct SpeechPatterns {
    bracket_code: Regex,
    code_markers: Regex,
    fenced_code: Regex,
    inline_code: Regex,
    markdown_image: Regex,
    url: Regex,
    html_tag: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static SpeechPatterns {
    static PATTERNS: OnceLock<SpeechPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SpeechPatterns {
        bracket_code: Regex::new(r"(?is)\[CODE\].*?\[/CODE\]").expect("valid regex"),
        code_markers: Regex::new(r"(?i)\[/?CODE\]").expect("valid regex"),
        fenced_code: Regex::new(r"(?s)```.*?```").expect("valid regex"),
        inline_code: Regex::new(r"`[^`]*`").expect("valid regex"),
        markdown_image: Regex::new(r"!\[[^\n]*?\]\([^\n]*?\)").expect("valid regex"),
        url: Regex::new(r"https?://\S+").expect("valid regex"),
        html_tag: Regex::new(r"</?[^>]+(?:>|$)").expect("valid regex"),
        whitespace: Regex::new(r"\s+").expect("valid regex"),
    })
}

/// Strips code, images, links and markup so only prose is read aloud.
pub fn speech_text(text: &str) -> String {
    let patterns = patterns();
    let text = patterns.bracket_code.replace_all(text, "");
    let text = patterns.code_markers.replace_all(&text, "");
    let text = patterns.fenced_code.replace_all(&text, "");
    let text = patterns.inline_code.replace_all(&text, "");
    let text = patterns.markdown_image.replace_all(&text, "");
    let text = patterns.url.replace_all(&text, "");
    let text = patterns.html_tag.replace_all(&text, "");
    let text = patterns.whitespace.replace_all(&text, " ");
    text.trim().to_string()
}
