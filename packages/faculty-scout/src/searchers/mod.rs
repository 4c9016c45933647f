//! Web search implementations for the search-engine discovery tier.

mod tavily;

pub use tavily::TavilySearcher;
