//! Content classifier implementations.
//!
//! Reference adapters for [`ContentClassifier`](crate::traits::classifier::ContentClassifier).
//! Applications can use these directly or implement their own.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAiClassifier;
