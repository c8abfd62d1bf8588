use regex::Regex;
use std::sync::OnceLock;

use crate::codec::{self, DecodeError};

const SOURCE_ATTR: &str = "data-typst-source";
const SIZE_ATTR: &str = "data-typst-size";

/// A rendered graphic together with what it was rendered from.
///
/// The source travels inside the exported SVG so the same graphic can be
/// opened again, edited and re-rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Graphic {
    pub svg: String,
    pub source: String,
    pub font_size: f32,
}

fn attr_pattern(name: &str) -> Regex {
    Regex::new(&format!(r#"\s{}="([^"]*)""#, regex::escape(name))).expect("attribute pattern is valid")
}

fn source_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| attr_pattern(SOURCE_ATTR))
}

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| attr_pattern(SIZE_ATTR))
}

impl Graphic {
    /// SVG with the encoded source and size attached to the root element
    pub fn to_tagged_svg(&self) -> String {
        let Some(at) = self.svg.find("<svg").map(|i| i + "<svg".len()) else {
            return self.svg.clone();
        };

        // Drop stale tags from a graphic that was edited and re-rendered
        let (head, rest) = self.svg.split_at(at);
        let rest = source_pattern().replace(rest, "");
        let rest = size_pattern().replace(&rest, "");

        format!(
            r#"{} {}="{}" {}="{}"{}"#,
            head,
            SOURCE_ATTR,
            codec::encode(&self.source),
            SIZE_ATTR,
            self.font_size,
            rest
        )
    }

    /// Recover source and size from an exported SVG
    pub fn from_tagged_svg(svg: &str) -> Result<Self, DecodeError> {
        let blob = source_pattern()
            .captures(svg)
            .ok_or(DecodeError::Missing(SOURCE_ATTR))?;
        let source = codec::decode(&blob[1])?;

        let size = size_pattern()
            .captures(svg)
            .ok_or(DecodeError::Missing(SIZE_ATTR))?;
        let font_size: f32 = size[1].parse().map_err(|_| DecodeError::Invalid {
            field: SIZE_ATTR,
            value: size[1].to_string(),
        })?;

        Ok(Self {
            svg: svg.to_string(),
            source,
            font_size,
        })
    }
}
