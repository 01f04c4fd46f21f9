//! HTML resource inlining.
//!
//! [`HtmlInliner`] loads a report document and rewrites every external
//! reference it knows about so the result renders with no network or
//! filesystem access:
//!
//! | Reference | Becomes |
//! |-----------|---------|
//! | `<link rel="stylesheet" href>` | `<style>` with the stylesheet text |
//! | `<script src></script>` | inline `<script>` |
//! | `<img src>` | `data:` URI |
//! | CSS `url(...)` in `<style>` and inlined stylesheets | `data:` URI |
//!
//! Relative references resolve against the URL of the document (or
//! stylesheet) that contains them. Documents load over `http`/`https` or
//! from the filesystem. A missing main document fails the conversion; a
//! missing sub-resource is logged and its reference left as it was.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use publish_report_core::models::{InlinedDocument, ReportSource};
use publish_report_core::ReportError;
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::OnceLock;
use url::Url;

use crate::traits::Inliner;

/// Message for a report that cannot be loaded at all.
pub const CONVERSION_FAILED_MESSAGE: &str =
    "the report could not be converted, validate that the report exists !";

struct Patterns {
    element: Regex,
    attr: Regex,
    src_attr: Regex,
    css_url: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        element: Regex::new(concat!(
            r"(?is)(?P<comment><!--.*?-->)",
            r"|(?P<style><style\b[^>]*>)(?P<css>.*?)</style\s*>",
            r"|(?P<script><script\b[^>]*>)(?P<js>.*?)</script\s*>",
            r"|(?P<link><link\b[^>]*>)",
            r"|(?P<img><img\b[^>]*>)",
        ))
        .expect("element pattern"),
        attr: Regex::new(
            r#"(?is)([a-z][a-z0-9:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
        )
        .expect("attribute pattern"),
        src_attr: Regex::new(r#"(?is)[\s"'](src\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))"#)
            .expect("src pattern"),
        css_url: Regex::new(r#"(?i)url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).expect("css url pattern"),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TagKind {
    Comment,
    Style,
    Script,
    Stylesheet,
    Image,
}

/// One markup element found in the source document.
#[derive(Debug)]
struct Element {
    kind: TagKind,
    span: Range<usize>,
    open_tag: Range<usize>,
    body: Range<usize>,
}

impl Element {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let (kind, open, body) = if caps.name("comment").is_some() {
            (TagKind::Comment, whole, None)
        } else if let Some(open) = caps.name("style") {
            (TagKind::Style, open, caps.name("css"))
        } else if let Some(open) = caps.name("script") {
            (TagKind::Script, open, caps.name("js"))
        } else if let Some(open) = caps.name("link") {
            (TagKind::Stylesheet, open, None)
        } else {
            (TagKind::Image, caps.name("img")?, None)
        };
        let body = body
            .map(|b| b.range())
            .unwrap_or(whole.end()..whole.end());
        Some(Self {
            kind,
            span: whole.range(),
            open_tag: open.range(),
            body,
        })
    }
}

/// Inlines stylesheets, scripts, images, and CSS urls into one document.
#[derive(Clone, Default)]
pub struct HtmlInliner {
    client: reqwest::Client,
}

impl HtmlInliner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Inline `html`, resolving relative references against `base`.
    ///
    /// Elements are rewritten in one left-to-right pass over the source, so
    /// text that was just inlined is never scanned again. Comments and the
    /// bodies of inline scripts are copied as they are.
    pub async fn inline_html(&self, html: &str, base: &Url) -> String {
        let elements: Vec<Element> = patterns()
            .element
            .captures_iter(html)
            .filter_map(|caps| Element::from_captures(&caps))
            .collect();

        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        for element in elements {
            out.push_str(&html[last..element.span.start]);
            match self.rewrite_element(&element, html, base).await {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(&html[element.span.clone()]),
            }
            last = element.span.end;
        }
        out.push_str(&html[last..]);
        out
    }

    async fn rewrite_element(&self, element: &Element, html: &str, base: &Url) -> Option<String> {
        let tag = &html[element.open_tag.clone()];
        let body = &html[element.body.clone()];
        match element.kind {
            TagKind::Comment => None,
            TagKind::Style => {
                let css = self.inline_css_urls(body, base).await;
                let close = &html[element.body.end..element.span.end];
                Some(format!("{}{}{}", tag, css, close))
            }
            TagKind::Stylesheet => {
                let attrs = parse_attributes(tag);
                let rel = attrs.attr("rel")?.to_ascii_lowercase();
                if !rel.split_whitespace().any(|r| r == "stylesheet") {
                    return None;
                }
                let href = inlinable(attrs.attr("href")?)?;
                let url = base.join(href).ok()?;
                let css = self.load_text(&url).await?;
                let css = self.inline_css_urls(&css, &url).await;
                let media = attrs
                    .attr("media")
                    .map(|m| format!(" media=\"{}\"", m))
                    .unwrap_or_default();
                Some(format!("<style{}>\n{}\n</style>", media, css))
            }
            TagKind::Script => {
                if !body.trim().is_empty() {
                    return None;
                }
                let attrs = parse_attributes(tag);
                let src = inlinable(attrs.attr("src")?)?;
                let url = base.join(src).ok()?;
                let js = self.load_text(&url).await?;
                let kept: String = attrs
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), "src" | "integrity" | "crossorigin"))
                    .map(|(k, v)| format!(" {}=\"{}\"", k, v))
                    .collect();
                Some(format!(
                    "<script{}>\n{}\n</script>",
                    kept,
                    js.replace("</script", "<\\/script")
                ))
            }
            TagKind::Image => {
                let attrs = parse_attributes(tag);
                let src = inlinable(attrs.attr("src")?)?;
                let data = self.data_uri(src, base).await?;
                let caps = patterns().src_attr.captures(tag)?;
                let src_span = caps.get(1)?.range();
                Some(format!(
                    "{}src=\"{}\"{}",
                    &tag[..src_span.start],
                    data,
                    &tag[src_span.end..]
                ))
            }
        }
    }

    /// Rewrite `url(...)` references in a stylesheet to `data:` URIs.
    async fn inline_css_urls(&self, css: &str, base: &Url) -> String {
        let spans: Vec<(usize, usize, String)> = patterns()
            .css_url
            .captures_iter(css)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), caps[1].trim().to_string()))
            })
            .collect();

        let mut out = String::with_capacity(css.len());
        let mut last = 0;
        for (start, end, reference) in spans {
            out.push_str(&css[last..start]);
            let data = match inlinable(&reference) {
                Some(r) => self.data_uri(r, base).await,
                None => None,
            };
            match data {
                Some(data) => out.push_str(&format!("url(\"{}\")", data)),
                None => out.push_str(&css[start..end]),
            }
            last = end;
        }
        out.push_str(&css[last..]);
        out
    }

    async fn data_uri(&self, reference: &str, base: &Url) -> Option<String> {
        let url = base.join(reference).ok()?;
        match self.load(&url).await {
            Ok((bytes, content_type)) => {
                let mime = content_type.unwrap_or_else(|| detect_mime(url.path()).to_string());
                Some(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
            }
            Err(e) => {
                tracing::warn!(resource = %url, error = %e, "resource not inlined");
                None
            }
        }
    }

    async fn load_text(&self, url: &Url) -> Option<String> {
        match self.load(url).await {
            Ok((bytes, _)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::warn!(resource = %url, error = %e, "resource not inlined");
                None
            }
        }
    }

    /// Load a resource, returning its bytes and the server's content type.
    async fn load(&self, url: &Url) -> Result<(Vec<u8>, Option<String>)> {
        match url.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .with_context(|| format!("request failed: {}", url))?
                    .error_for_status()?;
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
                let bytes = response.bytes().await?;
                Ok((bytes.to_vec(), content_type))
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow!("not a local file url: {}", url))?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Ok((bytes, None))
            }
            other => bail!("unsupported scheme '{}': {}", other, url),
        }
    }

    async fn source_url(source: &ReportSource) -> Result<Url> {
        match source {
            ReportSource::Url(url) => Ok(Url::parse(url)?),
            ReportSource::Path(path) => {
                let absolute = tokio::fs::canonicalize(path)
                    .await
                    .with_context(|| format!("report not found: {}", path.display()))?;
                Url::from_file_path(&absolute)
                    .map_err(|_| anyhow!("cannot address {} as a url", absolute.display()))
            }
        }
    }
}

#[async_trait]
impl Inliner for HtmlInliner {
    async fn inline(&self, source: &ReportSource) -> Result<InlinedDocument> {
        let loaded = match Self::source_url(source).await {
            Ok(base) => self.load(&base).await.map(|(bytes, _)| (base, bytes)),
            Err(e) => Err(e),
        };
        let (base, bytes) = loaded.map_err(|e| {
            tracing::warn!(source = %source, error = %e, "report could not be loaded");
            anyhow!(ReportError::ConversionFailed(
                CONVERSION_FAILED_MESSAGE.to_string()
            ))
        })?;

        let html = String::from_utf8_lossy(&bytes);
        let inlined = self.inline_html(&html, &base).await;
        tracing::debug!(source = %source, bytes = inlined.len(), "report inlined");
        Ok(InlinedDocument::new(inlined))
    }
}

/// `None` for references that must not be fetched.
fn inlinable(reference: &str) -> Option<&str> {
    let reference = reference.trim();
    let lower = reference.to_ascii_lowercase();
    let skip = reference.is_empty()
        || reference.starts_with('#')
        || ["data:", "javascript:", "about:", "mailto:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme));
    (!skip).then_some(reference)
}

fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    patterns()
        .attr
        .captures_iter(tag)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().replace("&amp;", "&"))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

trait AttributeLookup {
    fn attr(&self, name: &str) -> Option<&str>;
}

impl AttributeLookup for Vec<(String, String)> {
    fn attr(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Guess a MIME type from a file extension.
fn detect_mime(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "css" => "text/css",
        "js" => "application/javascript",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
