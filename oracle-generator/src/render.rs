/// Markdown rendering, sanitization, titles and slugs

use pulldown_cmark::{html, Options, Parser};
use rand::{rngs::OsRng, RngCore};

/// Title used when the text has no top-level heading
pub const DEFAULT_TITLE: &str = "Creative Piece";

/// Longest stored title, in characters
pub const MAX_TITLE_CHARS: usize = 255;

/// Random bytes per slug (hex doubles the length)
pub const SLUG_BYTES: usize = 6;

/// Renders Markdown to HTML without any sanitization
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Strips scripts, event handlers and other executable markup
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

/// Markdown to display-safe HTML
pub fn render_markdown(markdown: &str) -> String {
    sanitize_html(&markdown_to_html(markdown))
}

/// Title from the first `# Heading` line, else [`DEFAULT_TITLE`]
///
/// Only level-one headings count; `## Sub` lines are skipped.
pub fn derive_title(text: &str) -> String {
    text.lines()
        .filter_map(|line| line.trim_start().strip_prefix('#'))
        .filter(|rest| !rest.starts_with('#'))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(|title| title.chars().take(MAX_TITLE_CHARS).collect())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// Opaque public identifier: 6 random bytes as 12 hex characters
pub fn generate_slug() -> String {
    let mut bytes = [0u8; SLUG_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_markdown() {
        let html = render_markdown("# Ode\n\nTo **joy**.");
        assert!(html.contains("<h1>Ode</h1>"));
        assert!(html.contains("<strong>joy</strong>"));
    }

    #[test]
    fn test_render_strips_scripts_and_handlers() {
        let html = render_markdown(
            "Hi <script>alert(1)</script>\n\n<img src=\"https://x/y.png\" onerror=\"alert(2)\">",
        );
        assert!(!html.contains("<script"));
        assert!(!html.contains("onerror"));
        assert!(html.contains("https://x/y.png"));
    }

    #[test]
    fn test_render_keeps_images() {
        let html = render_markdown("![Rome](https://upload.wikimedia.org/rome.jpg)");
        assert!(html.contains("<img"));
        assert!(html.contains(r#"src="https://upload.wikimedia.org/rome.jpg""#));
        assert!(html.contains(r#"alt="Rome""#));
    }

    #[test]
    fn test_render_drops_javascript_links() {
        let html = render_markdown("[click](javascript:alert(1))");
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("# The Raven \nOnce upon"), "The Raven");
        assert_eq!(derive_title("\n\n#Tight\n"), "Tight");
        assert_eq!(derive_title("Intro\n## Sub\n# Real"), "Real");
        assert_eq!(derive_title("no heading here"), DEFAULT_TITLE);
        assert_eq!(derive_title("#\n#   \n"), DEFAULT_TITLE);
    }

    #[test]
    fn test_derive_title_truncates() {
        let long = format!("# {}", "é".repeat(400));
        assert_eq!(derive_title(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_slug_shape() {
        let slug = generate_slug();
        assert_eq!(slug.len(), SLUG_BYTES * 2);
        assert!(slug.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(slug, generate_slug());
    }
}
