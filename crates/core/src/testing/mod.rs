//! Test doubles for the search engine.

mod mock_source;

pub use mock_source::MockSource;
