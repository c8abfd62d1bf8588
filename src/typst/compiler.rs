/// Compiler service boundary
///
/// The compiler takes a set of `{ path, text }` sources plus the entry path
/// and answers with either an artifact or diagnostics. `TypstCli` drives the
/// `typst` executable; anything else implementing [`Compiler`] can stand in.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One compiler-reported problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Virtual path of the offending source, when known
    pub path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: None,
            line: None,
            column: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}:", path)?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, "{}:{}:", line, column)?;
            }
            write!(f, " ")?;
        }
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", severity, self.message)
    }
}

/// A named source handed to the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

/// Compiler answer: `result` is present exactly when compilation succeeded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileResponse {
    pub result: Option<Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The compiler or renderer could not be driven at all
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to run compiler: {0}")]
    Io(#[from] io::Error),
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, sources: &[SourceFile], entry: &str) -> Result<CompileResponse, ServiceError>;
}

/// Compiles through the `typst` command line tool into SVG
#[derive(Debug, Clone)]
pub struct TypstCli {
    binary: PathBuf,
    font_paths: Vec<PathBuf>,
}

impl TypstCli {
    pub fn new(binary: impl Into<PathBuf>, font_paths: Vec<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            font_paths,
        }
    }
}

/// Map a virtual path like `/main.typ` into `root`
fn local_path(root: &Path, virtual_path: &str) -> PathBuf {
    root.join(virtual_path.trim_start_matches('/'))
}

#[async_trait]
impl Compiler for TypstCli {
    async fn compile(&self, sources: &[SourceFile], entry: &str) -> Result<CompileResponse, ServiceError> {
        let workspace = tempfile::tempdir()?;
        let root = workspace.path();

        for source in sources {
            let path = local_path(root, &source.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &source.text).await?;
        }

        let output_path = root.join("output.svg");
        let mut command = Command::new(&self.binary);
        command
            .current_dir(root)
            .arg("compile")
            .arg("--root")
            .arg(root)
            .arg("--format")
            .arg("svg")
            .arg("--diagnostic-format")
            .arg("short");
        for font_path in &self.font_paths {
            command.arg("--font-path").arg(font_path);
        }
        command
            .arg(local_path(root, entry))
            .arg(&output_path)
            .stdin(Stdio::null());

        debug!("Running {:?}", command);
        let output = command.output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = parse_diagnostics(&stderr, root);

        if !output.status.success() {
            if !diagnostics.iter().any(|d| d.severity == Severity::Error) {
                let text = stderr.trim();
                diagnostics.push(Diagnostic::error(if text.is_empty() {
                    format!("typst exited with {}", output.status)
                } else {
                    text.to_string()
                }));
            }
            return Ok(CompileResponse {
                result: None,
                diagnostics,
            });
        }

        let artifact = tokio::fs::read(&output_path).await?;
        Ok(CompileResponse {
            result: Some(artifact),
            diagnostics,
        })
    }
}

fn diagnostic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<path>.+?):(?P<line>\d+):(?P<column>\d+): )?(?P<severity>error|warning): (?P<message>.*)$")
            .expect("diagnostic pattern is valid")
    })
}

/// Parse `--diagnostic-format short` output.
///
/// Paths are reported back as virtual paths rooted at `/`.
fn parse_diagnostics(stderr: &str, root: &Path) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter_map(|line| diagnostic_pattern().captures(line.trim_end()))
        .map(|caps| {
            let path = caps.name("path").map(|p| {
                let p = Path::new(p.as_str());
                let relative = p.strip_prefix(root).unwrap_or(p);
                format!("/{}", relative.to_string_lossy().trim_start_matches('/'))
            });
            Diagnostic {
                severity: if &caps["severity"] == "error" {
                    Severity::Error
                } else {
                    Severity::Warning
                },
                path,
                line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
                column: caps.name("column").and_then(|m| m.as_str().parse().ok()),
                message: caps["message"].to_string(),
            }
        })
        .collect()
}
