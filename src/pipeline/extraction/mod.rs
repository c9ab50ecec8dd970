pub mod engine;
pub mod format;
pub mod llm;
pub mod prompt;

pub use engine::*;
pub use llm::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No text to extract from")]
    EmptyInput,

    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    #[error("Model output is not valid JSON: {0}")]
    JsonParsing(String),
}
