/// Compile/render pipeline
///
/// Wraps user source in a fixed preamble, compiles it as `/main.typ`, and
/// renders the artifact to SVG. Every call is independent: nothing is cached
/// and concurrent calls are not merged. Callers that display results use a
/// [`RequestSequence`] to ignore answers that arrive after a newer request
/// was issued.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::compiler::{Compiler, Diagnostic, ServiceError, Severity, SourceFile};
use super::graphic::Graphic;
use super::renderer::{DataSelection, RenderFormat, RenderRequest, Renderer};

/// Virtual entry path of the synthesized document
pub const MAIN_FILE_PATH: &str = "/main.typ";

/// Page setup that turns a document into a tight, transparent graphic
const PAGE_PREAMBLE: &str =
    "#set page(margin: 3pt, background: none, width: auto, fill: none, height: auto)";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Compilation failed:\n{}", format_diagnostics(.diagnostics))]
    Compilation { diagnostics: Vec<Diagnostic> },
    #[error("Font size must be a positive number, got {0}")]
    InvalidSize(f32),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for (i, diagnostic) in diagnostics.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{}", diagnostic);
    }
    out
}

/// How editor text is turned into Typst source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Used as written
    Markup,
    /// Wrapped in display math
    Math,
}

impl SourceMode {
    pub fn from_math_flag(math_mode: bool) -> Self {
        if math_mode {
            SourceMode::Math
        } else {
            SourceMode::Markup
        }
    }

    pub fn apply(self, code: &str) -> Cow<'_, str> {
        match self {
            SourceMode::Markup => Cow::Borrowed(code),
            SourceMode::Math => Cow::Owned(format!("$ {} $", code.trim())),
        }
    }
}

/// Full document for one request: preamble, size, then the user's source
pub fn build_document(source: &str, font_size: f32) -> String {
    format!("{}\n#set text(size: {}pt)\n{}", PAGE_PREAMBLE, font_size, source)
}

#[derive(Clone)]
pub struct RenderPipeline {
    compiler: Arc<dyn Compiler>,
    renderer: Arc<dyn Renderer>,
}

impl RenderPipeline {
    pub fn new(compiler: Arc<dyn Compiler>, renderer: Arc<dyn Renderer>) -> Self {
        Self { compiler, renderer }
    }

    /// Compile `source` at `font_size` points and render it to SVG
    pub async fn render(&self, source: &str, font_size: f32) -> Result<String, RenderError> {
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(RenderError::InvalidSize(font_size));
        }

        let sources = [SourceFile {
            path: MAIN_FILE_PATH.to_string(),
            text: build_document(source, font_size),
        }];
        let response = self.compiler.compile(&sources, MAIN_FILE_PATH).await?;

        for warning in response
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
        {
            warn!("Compiler warning: {}", warning);
        }

        let Some(artifact) = response.result else {
            error!("Compilation diagnostics: {}", format_diagnostics(&response.diagnostics));
            return Err(RenderError::Compilation {
                diagnostics: response.diagnostics,
            });
        };

        let svg = self
            .renderer
            .render_svg(RenderRequest {
                format: RenderFormat::Vector,
                artifact_content: &artifact,
                data_selection: DataSelection::EMBED,
            })
            .await?;

        info!("🖼️  Rendered {} bytes of SVG", svg.len());
        Ok(svg)
    }

    /// Render and keep the source alongside, ready for insertion
    pub async fn render_graphic(&self, source: &str, font_size: f32) -> Result<Graphic, RenderError> {
        let svg = self.render(source, font_size).await?;
        Ok(Graphic {
            svg,
            source: source.to_string(),
            font_size,
        })
    }
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline").finish_non_exhaustive()
    }
}

/// Stamp identifying one render request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Monotonic request stamps: only the latest request may update the display
#[derive(Debug, Default)]
pub struct RequestSequence {
    issued: AtomicU64,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a stamp for a new request, superseding all earlier ones
    pub fn begin(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether a finished request is still the most recent one
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }
}
