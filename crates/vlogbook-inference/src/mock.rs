//! Mock inference backend for deterministic testing.
//!
//! Implements every capability trait with configurable fixed responses and
//! a call log for assertions. Embeddings are generated deterministically
//! from the input text, so identical texts always embed identically.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vlogbook_core::{
    EmbeddingBackend, Error, GenerationBackend, Result, TranscriptionBackend,
};

/// Mock backend for tests.
#[derive(Clone)]
pub struct MockBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    transcript: Option<String>,
    summary: Option<String>,
    title: Option<String>,
    tags: Vec<String>,
    dimension: usize,
    embed_unavailable: bool,
    fail_transcription: bool,
    fail_generation: bool,
    fail_embedding: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            transcript: Some("mock transcript".to_string()),
            summary: Some("mock summary".to_string()),
            title: Some("Mock Title".to_string()),
            tags: Vec::new(),
            dimension: 16,
            embed_unavailable: false,
            fail_transcription: false,
            fail_generation: false,
            fail_embedding: false,
        }
    }
}

/// One recorded capability invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fixed transcript returned by `transcribe` (None = unavailable).
    pub fn with_transcript(mut self, transcript: Option<&str>) -> Self {
        Arc::make_mut(&mut self.config).transcript = transcript.map(String::from);
        self
    }

    /// Fixed summary returned by `summarize` (None = unavailable).
    pub fn with_summary(mut self, summary: Option<&str>) -> Self {
        Arc::make_mut(&mut self.config).summary = summary.map(String::from);
        self
    }

    /// Fixed title returned by `generate_title` (None = unavailable).
    pub fn with_title(mut self, title: Option<&str>) -> Self {
        Arc::make_mut(&mut self.config).title = title.map(String::from);
        self
    }

    /// Fixed tag suggestions returned by `suggest_tags`.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::make_mut(&mut self.config).tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Embedding output dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Make `embed` return `Ok(None)` (provider configured but unavailable).
    pub fn with_embed_unavailable(mut self) -> Self {
        Arc::make_mut(&mut self.config).embed_unavailable = true;
        self
    }

    /// Make `transcribe` return an error.
    pub fn with_failing_transcription(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_transcription = true;
        self
    }

    /// Make every generation stage return an error.
    pub fn with_failing_generation(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_generation = true;
        self
    }

    /// Make `embed` return an error.
    pub fn with_failing_embedding(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_embedding = true;
        self
    }

    /// All logged calls, for assertions.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of calls for one operation name.
    pub fn call_count(&self, operation: &str) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn log(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }
}

/// Deterministic embedding derived from the text bytes.
///
/// Not semantically meaningful, but stable: identical input yields an
/// identical unit-length vector.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        state ^= byte as u64;
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
    }

    let mut vector = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        // Map the top bits into [-1, 1)
        let value = ((state >> 40) as f32 / 8388608.0) - 1.0;
        vector.push(value);
    }

    let magnitude: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for v in &mut vector {
            *v /= magnitude;
        }
    }
    vector
}

#[async_trait]
impl TranscriptionBackend for MockBackend {
    async fn transcribe(&self, media_path: &Path, language: &str) -> Result<Option<String>> {
        self.log("transcribe", &format!("{}|{}", media_path.display(), language));
        if self.config.fail_transcription {
            return Err(Error::Transcription("simulated failure".to_string()));
        }
        Ok(self.config.transcript.clone())
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn summarize(&self, transcript: &str) -> Result<Option<String>> {
        self.log("summarize", transcript);
        if self.config.fail_generation {
            return Err(Error::Inference("simulated failure".to_string()));
        }
        Ok(self.config.summary.clone())
    }

    async fn generate_title(&self, summary: &str) -> Result<Option<String>> {
        self.log("generate_title", summary);
        if self.config.fail_generation {
            return Err(Error::Inference("simulated failure".to_string()));
        }
        Ok(self.config.title.clone())
    }

    async fn suggest_tags(
        &self,
        description: &str,
        _favorites: &[String],
        _existing: &[String],
    ) -> Result<Vec<String>> {
        self.log("suggest_tags", description);
        if self.config.fail_generation {
            return Err(Error::Inference("simulated failure".to_string()));
        }
        Ok(self.config.tags.clone())
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        self.log("embed", text);
        if self.config.fail_embedding {
            return Err(Error::Embedding("simulated failure".to_string()));
        }
        if self.config.embed_unavailable {
            return Ok(None);
        }
        Ok(Some(deterministic_embedding(text, self.config.dimension)))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_embedding_is_stable() {
        let a = deterministic_embedding("hello", 16);
        let b = deterministic_embedding("hello", 16);
        assert_eq!(a, b);

        let c = deterministic_embedding("other", 16);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deterministic_embedding_is_unit_length() {
        let v = deterministic_embedding("some text", 32);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockBackend::new();
        mock.embed("a").await.unwrap();
        mock.summarize("b").await.unwrap();

        assert_eq!(mock.call_count("embed"), 1);
        assert_eq!(mock.call_count("summarize"), 1);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_unavailable_embed() {
        let mock = MockBackend::new().with_embed_unavailable();
        assert_eq!(mock.embed("text").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_failing_generation() {
        let mock = MockBackend::new().with_failing_generation();
        assert!(mock.summarize("x").await.is_err());
        assert!(mock.generate_title("x").await.is_err());
        assert!(mock.suggest_tags("x", &[], &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_clone_shares_call_log() {
        let mock = MockBackend::new();
        let clone = mock.clone();
        clone.embed("text").await.unwrap();
        assert_eq!(mock.call_count("embed"), 1);
    }
}
