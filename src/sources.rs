// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source readers that turn text files, PDFs and web pages into plain text.

use anyhow::{bail, Context, Result};
use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for fetching a web page.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->")
        .expect("valid script/style pattern")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Plain text produced by a source, with the identifier it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub id: String,
    pub text: String,
}

/// Reads a source file: PDFs page by page, anything else as UTF-8 text.
pub fn read_file(path: &Path) -> Result<SourceText> {
    if !path.is_file() {
        bail!("Failed to read source file: {} not found", path.display());
    }

    let text = if is_pdf(path) {
        read_pdf(path)?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?
    };
    debug!(path = %path.display(), bytes = text.len(), "read source file");
    Ok(SourceText {
        id: path.display().to_string(),
        text,
    })
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Extracts the text of every page in order, each followed by a newline.
///
/// A page without extractable text (a scanned image, an unsupported font
/// encoding) contributes an empty line.
fn read_pdf(path: &Path) -> Result<String> {
    let doc = Document::load(path).with_context(|| {
        format!(
            "Failed to read source file: {} is not a readable PDF",
            path.display()
        )
    })?;

    let mut text = String::new();
    for page in doc.get_pages().into_keys() {
        match doc.extract_text(&[page]) {
            Ok(page_text) => text.push_str(page_text.trim_end_matches('\n')),
            Err(err) => warn!(
                path = %path.display(),
                page,
                error = %err,
                "no text extracted from PDF page"
            ),
        }
        text.push('\n');
    }
    Ok(text)
}

/// Fetches a web page and strips it down to its visible text.
pub fn fetch_page(url: &str) -> Result<SourceText> {
    let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
    let html = agent
        .get(url)
        .call()
        .with_context(|| format!("Failed to fetch {}", url))?
        .into_string()
        .with_context(|| format!("Failed to read body of {}", url))?;

    let text = clean_html(&html);
    debug!(url, bytes = text.len(), "fetched page");
    Ok(SourceText {
        id: url.to_string(),
        text,
    })
}

/// Drops scripts, styles, comments and tags, decodes common entities and
/// collapses whitespace runs to single spaces.
pub fn clean_html(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        // last, so "&amp;lt;" decodes to "&lt;" rather than "<"
        .replace("&amp;", "&")
}
