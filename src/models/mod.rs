// Data models for the dispatch and backend wire formats

pub mod completion;

pub use completion::{CompletionRequest, DispatchRequest};
