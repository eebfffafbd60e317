//! Content sniffing and rendering of model output.
//!
//! Precedence, first match wins:
//! 1. trimmed text is a `{...}` object that parses as JSON: structured data
//! 2. contains a backtick: markdown with code blocks
//! 3. contains both `<` and `>`: raw markup
//! 4. anything else: preformatted plain text
//!
//! Markup is passed through untouched under [`MarkupPolicy::Passthrough`].
//! Model output is trusted; nothing here sanitizes it. Use
//! [`MarkupPolicy::Escape`] where that trust does not hold.

use pulldown_cmark::{html, Event, Options, Parser};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderMode {
    StructuredData(Value),
    FormattedText,
    Markup,
    PlainText,
}

impl RenderMode {
    pub fn label(&self) -> &'static str {
        match self {
            RenderMode::StructuredData(_) => "structured-data",
            RenderMode::FormattedText => "formatted-text",
            RenderMode::Markup => "markup",
            RenderMode::PlainText => "plain-text",
        }
    }
}

/// What to do with HTML embedded in model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkupPolicy {
    #[default]
    Passthrough,
    Escape,
}

pub fn classify(text: &str) -> RenderMode {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return RenderMode::StructuredData(value);
        }
    }
    if text.contains('`') {
        return RenderMode::FormattedText;
    }
    if text.contains('<') && text.contains('>') {
        return RenderMode::Markup;
    }
    RenderMode::PlainText
}

/// HTML fragment for `text`, plus the mode it was rendered in.
pub fn to_html(text: &str, policy: MarkupPolicy) -> (RenderMode, String) {
    let mode = classify(text);
    let html = match &mode {
        RenderMode::StructuredData(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| text.to_string());
            format!("<pre class=\"json\">{}</pre>", escape(&pretty))
        }
        RenderMode::FormattedText => markdown(text, policy),
        RenderMode::Markup => match policy {
            MarkupPolicy::Passthrough => text.to_string(),
            MarkupPolicy::Escape => format!("<pre>{}</pre>", escape(text)),
        },
        RenderMode::PlainText => format!("<pre>{}</pre>", escape(text)),
    };
    (mode, html)
}

/// Text for a terminal: JSON is re-indented, everything else is verbatim.
pub fn to_terminal(text: &str) -> String {
    match classify(text) {
        RenderMode::StructuredData(value) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string())
        }
        _ => text.to_string(),
    }
}

/// Fenced code blocks come out as `<pre><code class="language-xx">` for the
/// page's highlighter.
fn markdown(text: &str, policy: MarkupPolicy) -> String {
    let parser = Parser::new_ext(text, Options::all()).map(|event| match (policy, event) {
        (MarkupPolicy::Escape, Event::Html(raw)) => Event::Text(raw),
        (_, event) => event,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
