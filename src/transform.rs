//! Link-rewrite transformer - stage 3 of the pipeline
//!
//! Parses fetched bytes as HTML, rewrites embedded references to archive
//! coordinates, and extracts text, metadata, and links. Rewriting is
//! deterministic and idempotent: running the transform again over already
//! rewritten output changes nothing further.

use crate::config::TransformationConfig;
use crate::coords::build_archive_url;
use crate::ingestion::sanitize_content;
use crate::models::{FetchedBlob, RewrittenDocument, SnapshotRecord, SnapshotStatus};
use chrono::Utc;
use encoding_rs::{Encoding, ISO_8859_15, UTF_8, WINDOWS_1252};
use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use url::Url;

/// Matches a reference that has already been rewritten into the relative
/// `/<timestamp>/<url>` form
static RELATIVE_REWRITTEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/\d{14}/").expect("relative-rewrite pattern is valid"));

/// Matches `url(...)` references inside CSS
static CSS_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(['"]?([^'")]+)['"]?\)"#).expect("css url pattern is valid"));

/// Element names excluded from text extraction
const NON_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "meta", "noscript"];

/// Rewrites snapshot HTML and extracts text, metadata, and links
pub struct Transformer {
    config: TransformationConfig,
    snapshot_base_url: String,
    /// Host of the content archive; references already pointing there are
    /// left alone
    archive_host: String,
}

impl Transformer {
    pub fn new(config: TransformationConfig, snapshot_base_url: &str) -> Self {
        let archive_host = Url::parse(snapshot_base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "web.archive.org".to_string());

        Self {
            config,
            snapshot_base_url: snapshot_base_url.trim_end_matches('/').to_string(),
            archive_host,
        }
    }

    /// Transforms a fetched blob into a rewritten document
    ///
    /// Sets status `Transforming` on entry and `Transformed` on success. A
    /// content defect (undecodable bytes, unserializable tree) sets status
    /// `Failed` and returns None; content defects are permanent and never
    /// retried.
    pub fn transform(
        &self,
        record: &mut SnapshotRecord,
        blob: &FetchedBlob,
    ) -> Option<RewrittenDocument> {
        record.set_status(SnapshotStatus::Transforming);
        tracing::info!("Transforming: {}", record.url);

        let sanitized = sanitize_content(&blob.content);
        let html = match decode_content(&sanitized, blob.encoding.as_deref()) {
            Some(html) => html,
            None => {
                tracing::error!("Failed to decode content: {}", record.url);
                record.set_status(SnapshotStatus::Failed);
                return None;
            }
        };

        let document = kuchiki::parse_html().one(html);

        if self.config.rewrite_links {
            self.rewrite_document(&document, record);
        }

        if self.config.remove_scripts {
            remove_elements(&document, "script");
        }

        if self.config.remove_comments {
            remove_comments(&document);
        }

        let metadata = extract_metadata(&document);
        let text_content = extract_text(&document);
        let links = extract_links(&document);

        let mut serialized = Vec::new();
        if let Err(e) = document.serialize(&mut serialized) {
            tracing::error!("Failed to serialize document for {}: {}", record.url, e);
            record.set_status(SnapshotStatus::Failed);
            return None;
        }
        let content = match String::from_utf8(serialized) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Serialized document is not UTF-8 for {}: {}", record.url, e);
                record.set_status(SnapshotStatus::Failed);
                return None;
            }
        };

        record.set_status(SnapshotStatus::Transformed);
        tracing::info!("Transformed successfully: {}", record.url);

        Some(RewrittenDocument {
            url: record.url.clone(),
            original_url: record.original_url.clone(),
            timestamp: record.timestamp.clone(),
            content,
            text_content,
            metadata,
            links,
            transformed_at: Utc::now(),
        })
    }

    /// Rewrites href/src attributes and `url()` references in style blocks
    fn rewrite_document(&self, document: &NodeRef, record: &SnapshotRecord) {
        for attr in ["href", "src"] {
            let selector = format!("[{}]", attr);
            let matches: Vec<_> = match document.select(&selector) {
                Ok(matches) => matches.collect(),
                Err(()) => continue,
            };

            for element in matches {
                let mut attrs = element.attributes.borrow_mut();
                let value = match attrs.get(attr) {
                    Some(value) => value.to_string(),
                    None => continue,
                };
                if let Some(rewritten) = self.rewrite_reference(&value, record) {
                    attrs.insert(attr, rewritten);
                }
            }
        }

        let styles: Vec<_> = match document.select("style") {
            Ok(matches) => matches.collect(),
            Err(()) => return,
        };

        for style in styles {
            let node = style.as_node();
            let css = node.text_contents();
            let rewritten = self.rewrite_css(&css, record);
            if rewritten != css {
                let children: Vec<_> = node.children().collect();
                for child in children {
                    child.detach();
                }
                node.append(NodeRef::new_text(rewritten));
            }
        }
    }

    /// Rewrites a single reference, or returns None to leave it untouched
    ///
    /// Skip rules, in order: non-rewritable schemes (fragment, data,
    /// javascript, mailto); references already pointing at the archive host;
    /// references already in the relative rewritten form. Anything else is
    /// resolved against the record's original URL and rewritten to carry the
    /// record's timestamp.
    fn rewrite_reference(&self, reference: &str, record: &SnapshotRecord) -> Option<String> {
        if reference.starts_with('#')
            || reference.starts_with("data:")
            || reference.starts_with("javascript:")
            || reference.starts_with("mailto:")
        {
            return None;
        }

        // Idempotence: a second pass must not double-rewrite
        if reference.contains(&self.archive_host) {
            return None;
        }
        if RELATIVE_REWRITTEN.is_match(reference) {
            return None;
        }

        let absolute = if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            let base = Url::parse(&record.original_url).ok()?;
            base.join(reference).ok()?.to_string()
        };

        if self.config.make_links_relative {
            Some(format!("/{}/{}", record.timestamp, absolute))
        } else {
            Some(build_archive_url(
                &self.snapshot_base_url,
                &record.timestamp,
                &absolute,
            ))
        }
    }

    /// Applies the reference rewrite rule to every `url(...)` in a CSS block
    fn rewrite_css(&self, css: &str, record: &SnapshotRecord) -> String {
        CSS_URL
            .replace_all(css, |caps: &regex::Captures| {
                match self.rewrite_reference(&caps[1], record) {
                    Some(rewritten) => format!("url(\"{}\")", rewritten),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Decodes bytes to text, trying the declared encoding first and then a
/// fixed fallback chain
///
/// Each candidate is tried strictly (no replacement characters); the first
/// that decodes cleanly wins. Returns None only when every candidate fails.
fn decode_content(content: &[u8], declared: Option<&str>) -> Option<String> {
    let mut chain: Vec<&'static Encoding> = Vec::new();

    if let Some(label) = declared {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            chain.push(encoding);
        }
    }
    for fallback in [UTF_8, WINDOWS_1252, ISO_8859_15] {
        if !chain.contains(&fallback) {
            chain.push(fallback);
        }
    }

    for encoding in chain {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(content) {
            return Some(text.into_owned());
        }
    }
    None
}

/// Extracts the title, meta name/property pairs, and page language
fn extract_metadata(document: &NodeRef) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    if let Ok(title) = document.select_first("title") {
        let text = title.text_contents().trim().to_string();
        if !text.is_empty() {
            metadata.insert("title".to_string(), text);
        }
    }

    if let Ok(metas) = document.select("meta") {
        for meta in metas {
            let attrs = meta.attributes.borrow();
            let name = attrs.get("name").or_else(|| attrs.get("property"));
            if let (Some(name), Some(content)) = (name, attrs.get("content")) {
                metadata.insert(name.to_string(), content.to_string());
            }
        }
    }

    if let Ok(html) = document.select_first("html") {
        if let Some(lang) = html.attributes.borrow().get("lang") {
            if !lang.is_empty() {
                metadata.insert("language".to_string(), lang.to_string());
            }
        }
    }

    metadata
}

/// Returns the visible text with whitespace collapsed to single spaces
///
/// Walks the tree without mutating it, skipping script, style, meta, and
/// noscript subtrees.
fn extract_text(document: &NodeRef) -> String {
    let mut raw = String::new();
    collect_text(document, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(node: &NodeRef, out: &mut String) {
    if let Some(element) = node.as_element() {
        let name: &str = &element.name.local;
        if NON_TEXT_ELEMENTS.contains(&name) {
            return;
        }
    }

    if let Some(text) = node.as_text() {
        out.push_str(&text.borrow());
        out.push(' ');
    }

    for child in node.children() {
        collect_text(&child, out);
    }
}

/// Collects the deduplicated href/src values present after rewriting,
/// preserving first-seen order
fn extract_links(document: &NodeRef) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    for attr in ["href", "src"] {
        let selector = format!("[{}]", attr);
        if let Ok(matches) = document.select(&selector) {
            for element in matches {
                if let Some(value) = element.attributes.borrow().get(attr) {
                    if seen.insert(value.to_string()) {
                        links.push(value.to_string());
                    }
                }
            }
        }
    }

    links
}

/// Detaches every element with the given name
fn remove_elements(document: &NodeRef, name: &str) {
    if let Ok(matches) = document.select(name) {
        let nodes: Vec<_> = matches.collect();
        for node in nodes {
            node.as_node().detach();
        }
    }
}

/// Detaches every comment node
fn remove_comments(document: &NodeRef) {
    let comments: Vec<NodeRef> = document
        .inclusive_descendants()
        .filter(|node| node.as_comment().is_some())
        .collect();
    for comment in comments {
        comment.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMP: &str = "20090430060114";

    fn test_record() -> SnapshotRecord {
        SnapshotRecord::new(
            format!("https://web.archive.org/web/{}/http://example.com/", TIMESTAMP),
            "http://example.com/".to_string(),
            TIMESTAMP.to_string(),
        )
    }

    fn test_blob(html: &str) -> FetchedBlob {
        FetchedBlob {
            url: format!("https://web.archive.org/web/{}/http://example.com/", TIMESTAMP),
            content: html.as_bytes().to_vec(),
            headers: HashMap::new(),
            encoding: Some("utf-8".to_string()),
            downloaded_at: Utc::now(),
        }
    }

    fn default_transformer() -> Transformer {
        Transformer::new(TransformationConfig::default(), "https://web.archive.org/web")
    }

    #[test]
    fn test_rewrite_relative_reference() {
        let transformer = default_transformer();
        let record = test_record();

        let rewritten = transformer.rewrite_reference("/page.html", &record).unwrap();
        assert_eq!(rewritten, format!("/{}/http://example.com/page.html", TIMESTAMP));
    }

    #[test]
    fn test_rewrite_is_idempotent_on_reference() {
        let transformer = default_transformer();
        let record = test_record();

        let once = transformer.rewrite_reference("/page.html", &record).unwrap();
        // Re-applying the rule to the rewritten form changes nothing
        assert!(transformer.rewrite_reference(&once, &record).is_none());
    }

    #[test]
    fn test_rewrite_skips_non_rewritable_schemes() {
        let transformer = default_transformer();
        let record = test_record();

        for reference in ["#anchor", "data:image/png;base64,AAAA", "javascript:void(0)", "mailto:a@b.c"] {
            assert!(transformer.rewrite_reference(reference, &record).is_none());
        }
    }

    #[test]
    fn test_rewrite_skips_archive_host() {
        let transformer = default_transformer();
        let record = test_record();

        assert!(transformer
            .rewrite_reference("https://web.archive.org/web/20000101000000/http://x/", &record)
            .is_none());
    }

    #[test]
    fn test_rewrite_resolves_protocol_relative() {
        let transformer = default_transformer();
        let record = test_record();

        let rewritten = transformer
            .rewrite_reference("//cdn.example.com/lib.js", &record)
            .unwrap();
        assert_eq!(
            rewritten,
            format!("/{}/http://cdn.example.com/lib.js", TIMESTAMP)
        );
    }

    #[test]
    fn test_rewrite_full_coordinate_when_not_relative() {
        let transformer = Transformer::new(
            TransformationConfig {
                make_links_relative: false,
                ..TransformationConfig::default()
            },
            "https://web.archive.org/web",
        );
        let record = test_record();

        let rewritten = transformer.rewrite_reference("/page.html", &record).unwrap();
        assert_eq!(
            rewritten,
            format!(
                "https://web.archive.org/web/{}/http://example.com/page.html",
                TIMESTAMP
            )
        );
    }

    #[test]
    fn test_css_url_rewritten_like_attributes() {
        let transformer = default_transformer();
        let record = test_record();

        let css = "body { background: url(../x.png); }";
        let rewritten = transformer.rewrite_css(css, &record);
        assert_eq!(
            rewritten,
            format!(
                "body {{ background: url(\"/{}/http://example.com/x.png\"); }}",
                TIMESTAMP
            )
        );

        // Second pass leaves the CSS unchanged
        assert_eq!(transformer.rewrite_css(&rewritten, &record), rewritten);
    }

    #[test]
    fn test_css_data_url_untouched() {
        let transformer = default_transformer();
        let record = test_record();

        let css = "div { background: url('data:image/gif;base64,R0lGOD'); }";
        assert_eq!(transformer.rewrite_css(css, &record), css);
    }

    #[test]
    fn test_transform_rewrites_document() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob(
            r#"<html><head><title>Home</title></head>
            <body><a href="/page.html">link</a><img src="logo.png"></body></html>"#,
        );

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert_eq!(record.status, SnapshotStatus::Transformed);
        assert!(doc
            .content
            .contains(&format!("/{}/http://example.com/page.html", TIMESTAMP)));
        assert!(doc
            .content
            .contains(&format!("/{}/http://example.com/logo.png", TIMESTAMP)));
    }

    #[test]
    fn test_transform_is_idempotent_end_to_end() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob(
            r#"<html><head><style>a { background: url(/bg.png); }</style></head>
            <body><a href="relative/page.html">x</a></body></html>"#,
        );

        let first = transformer.transform(&mut record, &blob).unwrap();
        let second = transformer
            .transform(&mut record, &test_blob(&first.content))
            .unwrap();

        assert_eq!(first.content, second.content);
        assert_eq!(first.links, second.links);
    }

    #[test]
    fn test_metadata_extraction() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob(
            r#"<html lang="pt-br"><head><title> Velha Página </title>
            <meta name="description" content="an old page">
            <meta property="og:type" content="website">
            </head><body></body></html>"#,
        );

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert_eq!(doc.metadata.get("title").unwrap(), "Velha Página");
        assert_eq!(doc.metadata.get("description").unwrap(), "an old page");
        assert_eq!(doc.metadata.get("og:type").unwrap(), "website");
        assert_eq!(doc.metadata.get("language").unwrap(), "pt-br");
    }

    #[test]
    fn test_text_extraction_collapses_whitespace_and_skips_scripts() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob(
            "<html><head><style>p { color: red; }</style></head><body>\
             <p>first   \n\n  paragraph</p><script>var x = 1;</script>\
             <noscript>enable js</noscript><p>second</p></body></html>",
        );

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert_eq!(doc.text_content, "first paragraph second");
    }

    #[test]
    fn test_links_deduplicated_after_rewriting() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob(
            r#"<html><body><a href="/a.html">one</a><a href="/a.html">two</a>
            <img src="/b.png"></body></html>"#,
        );

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert_eq!(doc.links.len(), 2);
        assert_eq!(doc.links[0], format!("/{}/http://example.com/a.html", TIMESTAMP));
        assert_eq!(doc.links[1], format!("/{}/http://example.com/b.png", TIMESTAMP));
    }

    #[test]
    fn test_remove_scripts_toggle() {
        let transformer = Transformer::new(
            TransformationConfig {
                remove_scripts: true,
                ..TransformationConfig::default()
            },
            "https://web.archive.org/web",
        );
        let mut record = test_record();
        let blob = test_blob("<html><body><script>var x;</script><p>kept</p></body></html>");

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert!(!doc.content.contains("<script>"));
        assert!(doc.content.contains("kept"));
    }

    #[test]
    fn test_remove_comments_toggle() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob("<html><body><!-- hidden --><p>kept</p></body></html>");

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert!(!doc.content.contains("hidden"));

        let keep_comments = Transformer::new(
            TransformationConfig {
                remove_comments: false,
                ..TransformationConfig::default()
            },
            "https://web.archive.org/web",
        );
        let doc = keep_comments.transform(&mut record, &test_blob("<html><body><!-- hidden --></body></html>")).unwrap();
        assert!(doc.content.contains("hidden"));
    }

    #[test]
    fn test_decode_falls_back_for_legacy_bytes() {
        // 0xE9 is 'é' in windows-1252 but invalid UTF-8
        let bytes = b"caf\xe9";
        let decoded = decode_content(bytes, Some("utf-8")).unwrap();
        assert_eq!(decoded, "café");
    }

    #[test]
    fn test_decode_honors_declared_encoding() {
        let decoded = decode_content(b"plain ascii", Some("ISO-8859-1")).unwrap();
        assert_eq!(decoded, "plain ascii");
    }

    #[test]
    fn test_nul_bytes_stripped_before_parsing() {
        let transformer = default_transformer();
        let mut record = test_record();
        let blob = test_blob("<html><body><p>ab\0cd</p></body></html>");

        let doc = transformer.transform(&mut record, &blob).unwrap();
        assert_eq!(doc.text_content, "abcd");
    }
}
