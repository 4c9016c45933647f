//! Collaborator seams of the pipeline.
//!
//! The pipeline owns discovery, classification, extraction, pagination and
//! dedup; fetching, model calls, web search and storage are supplied by the
//! application through these traits.

pub mod classifier;
pub mod gateway;
pub mod searcher;
pub mod sink;

pub use classifier::{ClassifierInput, ContentClassifier, Label, RawRecord, RecordSchema};
pub use gateway::{FetchGateway, PageAction};
pub use searcher::{SearchResult, WebSearcher};
pub use sink::{ProfileBatch, ProfileSink};
