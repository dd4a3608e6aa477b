/// `[[WIKISEARCH: name]]` tag resolution
///
/// Every tag is replaced in place, left to right, by the result of its own
/// lookup:
///
/// ```text
/// found      ->  ![name](url)
/// not found  ->  > *[Image of name not found]*
/// ```
///
/// Lookup errors count as "not found". Identical tags are looked up and
/// replaced independently.

use crate::images::ImageLookup;
use regex::Regex;
use std::sync::OnceLock;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\[WIKISEARCH:\s*(.+?)\]\]").expect("tag pattern is a valid regex")
    })
}

/// Replacement text for a resolved tag
pub fn image_markdown(name: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => format!("![{}]({})", name, url),
        None => format!("> *[Image of {} not found]*", name),
    }
}

/// Names referenced by tags in `text`, in order of appearance
pub fn tag_names(text: &str) -> Vec<&str> {
    tag_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Resolves every image tag in `text`
pub async fn resolve_image_tags(text: &str, images: &dyn ImageLookup) -> String {
    let mut resolved = String::with_capacity(text.len());
    let mut cursor = 0;

    for caps in tag_pattern().captures_iter(text) {
        let (Some(tag), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();

        let url = match images.find_image(name).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    provider = images.name(),
                    entity = name,
                    error = %e,
                    "Image lookup failed, treating as not found"
                );
                None
            }
        };

        resolved.push_str(&text[cursor..tag.start()]);
        resolved.push_str(&image_markdown(name, url.as_deref()));
        cursor = tag.end();
    }

    resolved.push_str(&text[cursor..]);
    resolved
}
