//! Provider traits implemented by `bitrag-providers` and by test fakes.

pub mod embedding;
pub mod generator;

pub use embedding::EmbeddingProvider;
pub use generator::AnswerGenerator;
