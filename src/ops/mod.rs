// ============================================================================
// OPS — pixel operations on annotation buffers
// ============================================================================
//
//   shapes.rs    — SDF rasterization of strokes, shapes and the eraser ring
//   fill.rs      — exact-match flood fill
//   text.rs      — glyph layout and rasterization
//   clipboard.rs — clipboard export with viewer fallback
// ============================================================================

pub mod clipboard;
pub mod fill;
pub mod shapes;
pub mod text;
