//! Incremental content scanner.
//!
//! The scanner is re-run over the accumulated response text after every
//! chunk, starting at the safe prefix left by the previous pass. Structured
//! regions are claimed left to right with fenced code taking precedence
//! over markdown images, and bare image URLs are only looked for in the text
//! between claimed regions. A region becomes a segment only once it is
//! closed; everything after an unclosed opening fence or an image still
//! waiting for its `)` stays literal text.

use std::ops::Range;

use regex::{Regex, RegexBuilder};

pub const DEFAULT_CODE_LANGUAGE: &str = "javascript";
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
pub const DEFAULT_IMAGE_HOSTS: [&str; 1] = ["https://image.pollinations.ai/prompt/"];

const BRACKET_OPEN_LEN: usize = "[CODE]".len();
const BACKTICK_FENCE: &str = "```";
const IMAGE_OPEN_LEN: usize = "![".len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerOptions {
    /// Language tag for regions that carry no hint.
    pub default_language: String,
    pub image_extensions: Vec<String>,
    /// URL prefixes of image-generation services; URLs under these are
    /// images regardless of extension.
    pub image_hosts: Vec<String>,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            default_language: DEFAULT_CODE_LANGUAGE.to_string(),
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            image_hosts: DEFAULT_IMAGE_HOSTS
                .iter()
                .map(|host| host.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// `[CODE]...[/CODE]`, case-insensitive.
    BracketCode,
    /// Triple backticks with an optional language hint line.
    BacktickCode,
    /// `![alt](url` whose closing parenthesis has not arrived.
    MarkdownImage,
}

impl RegionKind {
    fn open_len(self) -> usize {
        match self {
            RegionKind::BracketCode => BRACKET_OPEN_LEN,
            RegionKind::BacktickCode => BACKTICK_FENCE.len(),
            RegionKind::MarkdownImage => IMAGE_OPEN_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRegion {
    pub kind: RegionKind,
    /// Byte offset of the opening marker in the accumulated text.
    pub start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedSegment {
    Text(String),
    Code { code: String, language: String },
    Image(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanPass {
    /// Segments for closed regions and the text preceding them.
    pub finalized: Vec<ScannedSegment>,
    /// Byte offset up to which the text is covered by `finalized`.
    pub safe_prefix: usize,
    /// Text after the safe prefix. Never contains `Code`.
    pub pending: Vec<ScannedSegment>,
    pub open_region: Option<OpenRegion>,
}

#[derive(Debug, Clone)]
pub struct ContentScanner {
    options: ScannerOptions,
    bracket_open: Regex,
    bracket_close: Regex,
    markdown_image: Regex,
    open_markdown_image: Regex,
    bare_image: Option<Regex>,
}

impl ContentScanner {
    pub fn new(options: ScannerOptions) -> Result<Self, regex::Error> {
        let bracket_open = RegexBuilder::new(r"\[CODE\]")
            .case_insensitive(true)
            .build()?;
        let bracket_close = RegexBuilder::new(r"\[/CODE\]")
            .case_insensitive(true)
            .build()?;
        let markdown_image = Regex::new(r"!\[[^\n]*?\]\(([^\n]*?)\)")?;
        let open_markdown_image = Regex::new(r"!\[[^\n]*?\]\([^\n)]*$")?;
        let bare_image = build_bare_image_pattern(&options)?;
        Ok(Self {
            options,
            bracket_open,
            bracket_close,
            markdown_image,
            open_markdown_image,
            bare_image,
        })
    }

    pub fn options(&self) -> &ScannerOptions {
        &self.options
    }

    /// Scans `text` from byte offset `from`, which must be a safe prefix
    /// returned by an earlier pass over a prefix of the same text.
    pub fn scan(&self, text: &str, from: usize) -> ScanPass {
        let from = if from <= text.len() && text.is_char_boundary(from) {
            from
        } else {
            0
        };
        let mut pass = ScanPass {
            safe_prefix: from,
            ..ScanPass::default()
        };
        let mut cursor = from;

        loop {
            let code_open = self.find_code_open(text, cursor);
            let image = self.find_markdown_image(text, cursor);

            match (image, code_open) {
                (Some((range, url)), code)
                    if code.map_or(true, |(open_start, _)| range.end <= open_start) =>
                {
                    self.split_text(&text[cursor..range.start], &mut pass.finalized);
                    pass.finalized.push(ScannedSegment::Image(url));
                    cursor = range.end;
                    pass.safe_prefix = cursor;
                }
                (_, Some((open_start, kind))) => {
                    let body_start = open_start + kind.open_len();
                    let Some(close) = self.find_code_close(text, kind, body_start) else {
                        self.push_pending(text, cursor, Some((open_start, kind)), &mut pass);
                        return pass;
                    };

                    self.split_text(&text[cursor..open_start], &mut pass.finalized);
                    if let Some(segment) = self.code_segment(kind, &text[body_start..close.start])
                    {
                        pass.finalized.push(segment);
                    }
                    cursor = close.end;
                    pass.safe_prefix = cursor;
                }
                _ => break,
            }
        }

        self.push_pending(text, cursor, None, &mut pass);
        pass
    }

    /// Moves `text[cursor..]` into the pending list. The earliest unclosed
    /// opener and everything after it stay literal, so bare URLs inside an
    /// image that is still arriving are not picked up.
    fn push_pending(
        &self,
        text: &str,
        cursor: usize,
        code_open: Option<(usize, RegionKind)>,
        pass: &mut ScanPass,
    ) {
        let before_code = code_open.map_or(text.len(), |(start, _)| start);
        let image_open = self
            .open_markdown_image
            .find_at(&text[..before_code], cursor)
            .map(|found| (found.start(), RegionKind::MarkdownImage));
        let Some((start, kind)) = image_open.or(code_open) else {
            self.split_text(&text[cursor..], &mut pass.pending);
            return;
        };
        self.split_text(&text[cursor..start], &mut pass.pending);
        push_text(&mut pass.pending, &text[start..]);
        pass.open_region = Some(OpenRegion { kind, start });
    }

    fn find_code_open(&self, text: &str, from: usize) -> Option<(usize, RegionKind)> {
        let bracket = self
            .bracket_open
            .find_at(text, from)
            .map(|found| (found.start(), RegionKind::BracketCode));
        let backtick = text[from..]
            .find(BACKTICK_FENCE)
            .map(|offset| (from + offset, RegionKind::BacktickCode));
        match (bracket, backtick) {
            (Some(bracket), Some(backtick)) => Some(if bracket.0 <= backtick.0 {
                bracket
            } else {
                backtick
            }),
            (bracket, backtick) => bracket.or(backtick),
        }
    }

    fn find_code_close(&self, text: &str, kind: RegionKind, from: usize) -> Option<Range<usize>> {
        match kind {
            RegionKind::BracketCode => self
                .bracket_close
                .find_at(text, from)
                .map(|found| found.range()),
            RegionKind::BacktickCode => text[from..].find(BACKTICK_FENCE).map(|offset| {
                let start = from + offset;
                start..start + BACKTICK_FENCE.len()
            }),
            RegionKind::MarkdownImage => None,
        }
    }

    fn find_markdown_image(&self, text: &str, from: usize) -> Option<(Range<usize>, String)> {
        let mut search_from = from;
        while let Some(captures) = self.markdown_image.captures_at(text, search_from) {
            let whole = captures.get(0)?;
            let url = captures
                .get(1)
                .map(|url| url.as_str().trim())
                .unwrap_or_default();
            if !url.is_empty() {
                return Some((whole.range(), url.to_string()));
            }
            // "![" is ASCII, so skipping it keeps the cursor on a char boundary.
            search_from = whole.start() + 2;
        }
        None
    }

    fn code_segment(&self, kind: RegionKind, body: &str) -> Option<ScannedSegment> {
        let (language, code) = match kind {
            RegionKind::BracketCode => (None, body),
            RegionKind::BacktickCode => split_fence_body(body),
            RegionKind::MarkdownImage => return None,
        };
        let code = code.trim();
        if code.is_empty() {
            return None;
        }
        if self.is_single_image_url(code) {
            return Some(ScannedSegment::Image(code.to_string()));
        }
        Some(ScannedSegment::Code {
            code: code.to_string(),
            language: language
                .map(str::to_string)
                .unwrap_or_else(|| self.options.default_language.clone()),
        })
    }

    fn is_single_image_url(&self, candidate: &str) -> bool {
        self.bare_image
            .as_ref()
            .and_then(|pattern| pattern.find(candidate))
            .is_some_and(|found| found.start() == 0 && found.end() == candidate.len())
    }

    fn split_text(&self, text: &str, out: &mut Vec<ScannedSegment>) {
        let mut last = 0;
        if let Some(pattern) = &self.bare_image {
            for found in pattern.find_iter(text) {
                push_text(out, &text[last..found.start()]);
                out.push(ScannedSegment::Image(found.as_str().to_string()));
                last = found.end();
            }
        }
        push_text(out, &text[last..]);
    }
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new(ScannerOptions::default()).expect("default scanner patterns are valid")
    }
}

fn build_bare_image_pattern(options: &ScannerOptions) -> Result<Option<Regex>, regex::Error> {
    let mut alternatives = Vec::new();
    let hosts = options
        .image_hosts
        .iter()
        .map(|host| host.trim())
        .filter(|host| !host.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if !hosts.is_empty() {
        alternatives.push(format!(r"(?:{})[^\s)]+", hosts.join("|")));
    }
    let extensions = options
        .image_extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if !extensions.is_empty() {
        alternatives.push(format!(
            r"https?://[^\s<]+\.(?:{})",
            extensions.join("|")
        ));
    }
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
}

/// Splits a backtick body into an optional language hint and the code.
fn split_fence_body(body: &str) -> (Option<&str>, &str) {
    let Some(newline) = body.find('\n') else {
        return (None, body);
    };
    let hint = body[..newline].trim();
    let is_word = hint
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '+' | '#' | '-'));
    if is_word {
        ((!hint.is_empty()).then_some(hint), &body[newline + 1..])
    } else {
        (None, body)
    }
}

fn push_text(out: &mut Vec<ScannedSegment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(ScannedSegment::Text(previous)) = out.last_mut() {
        previous.push_str(text);
    } else {
        out.push(ScannedSegment::Text(text.to_string()));
    }
}
