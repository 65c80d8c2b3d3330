//! Mock search source for testing.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::source::{SearchError, SearchResult, SearchSource};

/// Mock implementation of the `SearchSource` trait.
///
/// Provides controllable behavior for testing:
/// - Return configured results
/// - Track searched keywords for assertions
/// - Simulate failures and slow fetches
pub struct MockSource {
    name: String,
    priority: i32,
    results: Vec<SearchResult>,
    delay: Option<Duration>,
    fail: bool,
    searches: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: 0,
            results: Vec::new(),
            delay: None,
            fail: false,
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Results returned by every search.
    pub fn with_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = results;
        self
    }

    /// Sleep this long before answering, to simulate a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every search with a connection error.
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Keywords searched so far, in call order.
    pub fn recorded_searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, SearchError> {
        self.searches.lock().unwrap().push(keyword.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SearchError::ConnectionFailed("mock failure".to_string()));
        }
        Ok(self.results.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> SearchResult {
        SearchResult {
            unique_id: id.to_string(),
            title: id.to_string(),
            content: String::new(),
            datetime: None,
            channel: String::new(),
            links: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_returns_configured_results() {
        let source = MockSource::new("mock").with_results(vec![result("a"), result("b")]);
        let found = source.search("anything").await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_records_searches() {
        let source = MockSource::new("mock");
        source.search("first").await.unwrap();
        source.search("second").await.unwrap();

        assert_eq!(source.recorded_searches(), vec!["first", "second"]);
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let source = MockSource::new("mock").with_failure();
        assert!(source.search("kw").await.is_err());
        // The failed call is still recorded
        assert_eq!(source.call_count(), 1);
    }
}
