//! Generation service boundary: plan, research, write and synthesize.
//!
//! The broadcast loop depends only on [`GenerationClient`]; concrete clients
//! are injected at construction time.

#[cfg(feature = "gemini")]
pub mod gemini;
pub mod mock;
pub mod prompts;

use crate::error::{Result, StorycastError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use mock::{CallKind, MockGenerationClient, RecordedCall};
pub use prompts::PromptTemplates;

/// Chapter outline for one topic, created once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativePlan {
    pub main_topic: String,
    pub chapters: Vec<String>,
    /// Topic to continue with once every chapter has been narrated.
    pub next_pivot_topic: String,
}

impl NarrativePlan {
    /// Reject plans the broadcast loop cannot make progress on.
    pub fn validated(self) -> Result<Self> {
        if self.chapters.is_empty() {
            return Err(StorycastError::generation("plan", "plan has no chapters"));
        }
        if self.next_pivot_topic.trim().is_empty() {
            return Err(StorycastError::generation("plan", "plan has no pivot topic"));
        }
        Ok(self)
    }
}

/// One narrated chapter: spoken script plus a short title for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub script: String,
    pub display_title: String,
}

/// Client for the generation service.
///
/// Each operation is a single request/response with no retry of its own;
/// retrying is the broadcast loop's job.
#[async_trait::async_trait]
pub trait GenerationClient: Send + Sync {
    /// Outline `topic` into chapters and nominate a follow-up topic.
    async fn plan(&self, topic: &str) -> Result<NarrativePlan>;

    /// Gather notes for one chapter. An empty or fallback text is a valid result.
    async fn research(&self, chapter: &str, main_topic: &str) -> Result<String>;

    /// Turn research notes into a narration script.
    async fn write(&self, chapter: &str, notes: &str, context: &str) -> Result<Segment>;

    /// Synthesize speech: PCM16 little-endian mono bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Client name for logging.
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: GenerationClient + ?Sized> GenerationClient for Arc<T> {
    async fn plan(&self, topic: &str) -> Result<NarrativePlan> {
        (**self).plan(topic).await
    }

    async fn research(&self, chapter: &str, main_topic: &str) -> Result<String> {
        (**self).research(chapter, main_topic).await
    }

    async fn write(&self, chapter: &str, notes: &str, context: &str) -> Result<Segment> {
        (**self).write(chapter, notes, context).await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        (**self).synthesize(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_deserializes_from_camel_case() {
        let json = r#"{
            "mainTopic": "The Fall of Rome",
            "chapters": ["Omens", "The Sack"],
            "nextPivotTopic": "Byzantine Empire"
        }"#;
        let plan: NarrativePlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.main_topic, "The Fall of Rome");
        assert_eq!(plan.chapters.len(), 2);
        assert_eq!(plan.next_pivot_topic, "Byzantine Empire");
    }

    #[test]
    fn test_segment_deserializes_from_camel_case() {
        let json = r#"{"script": "Rome burns.", "displayTitle": "Embers"}"#;
        let segment: Segment = serde_json::from_str(json).unwrap();
        assert_eq!(segment.display_title, "Embers");
    }

    #[test]
    fn test_plan_without_chapters_is_rejected() {
        let plan = NarrativePlan {
            main_topic: "Rome".into(),
            chapters: vec![],
            next_pivot_topic: "Byzantium".into(),
        };
        let err = plan.validated().unwrap_err();
        assert!(err.to_string().contains("no chapters"));
    }

    #[test]
    fn test_plan_without_pivot_is_rejected() {
        let plan = NarrativePlan {
            main_topic: "Rome".into(),
            chapters: vec!["One".into()],
            next_pivot_topic: "  ".into(),
        };
        assert!(plan.validated().is_err());
    }

    #[tokio::test]
    async fn test_client_trait_through_arc() {
        let client: Arc<dyn GenerationClient> = Arc::new(MockGenerationClient::new());
        let shared = Arc::new(client);
        assert_eq!(shared.name(), "mock");
        assert!(shared.plan("Rome").await.is_ok());
    }
}
