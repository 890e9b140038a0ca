//! Extraction dispatch: instructions, the engine seam, and decoding of the
//! engine's output into a [`DocumentSchema`](crate::models::schema::DocumentSchema).

mod dispatcher;
mod engine;
pub mod gemini;
pub mod prompts;

pub use dispatcher::{parse_response, strip_code_fences, Dispatched, Dispatcher, Extracted};
pub use engine::{EngineRequest, EngineResponse, ExtractionEngine};
pub use gemini::GeminiEngine;
