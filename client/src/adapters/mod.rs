/// Gemini REST backend.
pub mod gemini;
