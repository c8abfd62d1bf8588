/// Renderer service boundary
///
/// Turns a compiled artifact into the final vector image, keeping only the
/// parts named in the [`DataSelection`].

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::compiler::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    Vector,
}

/// Which parts of the vector output to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelection {
    pub body: bool,
    pub defs: bool,
    pub css: bool,
    pub js: bool,
}

impl DataSelection {
    /// Static graphic for embedding: everything but scripts
    pub const EMBED: Self = Self {
        body: true,
        defs: true,
        css: true,
        js: false,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub format: RenderFormat,
    pub artifact_content: &'a [u8],
    pub data_selection: DataSelection,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render_svg(&self, request: RenderRequest<'_>) -> Result<String, ServiceError>;
}

/// Renders SVG artifacts by filtering their top-level parts
#[derive(Debug, Default, Clone, Copy)]
pub struct SvgRenderer;

struct Patterns {
    root: Regex,
    script: Regex,
    style: Regex,
    defs: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let element = |name: &str| {
            Regex::new(&format!(r"(?s)<{0}\b[^>]*/>|<{0}\b[^>]*>.*?</{0}>", name))
                .expect("element pattern is valid")
        };
        Patterns {
            root: Regex::new(r"<svg\b[^>]*>").expect("root pattern is valid"),
            script: element("script"),
            style: element("style"),
            defs: element("defs"),
        }
    })
}

/// Apply `selection` to an SVG document
pub fn select_parts(svg: &str, selection: DataSelection) -> Result<String, ServiceError> {
    let p = patterns();

    let root = p
        .root
        .find(svg)
        .ok_or_else(|| ServiceError::InvalidArtifact("no <svg> root element".to_string()))?;
    let close = svg
        .rfind("</svg>")
        .filter(|&close| close >= root.end())
        .ok_or_else(|| ServiceError::InvalidArtifact("unterminated <svg> element".to_string()))?;

    let head = &svg[..root.end()];
    let inner = &svg[root.end()..close];
    let tail = &svg[close..];

    let mut kept = inner.to_string();
    if !selection.js {
        kept = p.script.replace_all(&kept, "").into_owned();
    }

    if !selection.body {
        // Only definitions and styling survive without a body
        let mut parts = String::new();
        if selection.defs {
            parts.extend(p.defs.find_iter(&kept).map(|m| m.as_str()));
        }
        if selection.css {
            parts.extend(p.style.find_iter(&kept).map(|m| m.as_str()));
        }
        if selection.js {
            parts.extend(p.script.find_iter(&kept).map(|m| m.as_str()));
        }
        kept = parts;
    } else {
        if !selection.css {
            kept = p.style.replace_all(&kept, "").into_owned();
        }
        if !selection.defs {
            kept = p.defs.replace_all(&kept, "").into_owned();
        }
    }

    Ok(format!("{}{}{}", head, kept, tail))
}

#[async_trait]
impl Renderer for SvgRenderer {
    async fn render_svg(&self, request: RenderRequest<'_>) -> Result<String, ServiceError> {
        match request.format {
            RenderFormat::Vector => {}
        }

        let svg = std::str::from_utf8(request.artifact_content)
            .map_err(|e| ServiceError::InvalidArtifact(format!("artifact is not UTF-8: {}", e)))?;

        select_parts(svg, request.data_selection)
    }
}
