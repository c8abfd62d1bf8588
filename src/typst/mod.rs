/// Typst compile/render module
///
/// This module handles:
/// - The compiler service boundary and the `typst` CLI adapter (compiler.rs)
/// - SVG rendering with data selection (renderer.rs)
/// - Document synthesis, the render pipeline and request stamps (pipeline.rs)
/// - Graphics that carry their own source (graphic.rs)

pub mod compiler;
pub mod renderer;
pub mod pipeline;
pub mod graphic;
