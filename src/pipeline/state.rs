//! Story position owned by the broadcast loop.

use crate::generation::NarrativePlan;

/// What the loop should narrate next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Narrate chapter `index` of the current plan.
    Chapter { index: usize, title: String },
    /// Every chapter is done; the topic has moved on and a new plan is needed.
    Pivot { from: String, to: String },
}

/// Current topic, its plan (once created) and the next chapter to narrate.
///
/// Invariant: `chapter_index <= plan.chapters.len()` while a plan exists.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    topic: String,
    plan: Option<NarrativePlan>,
    chapter_index: usize,
}

impl PipelineState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            plan: None,
            chapter_index: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn plan(&self) -> Option<&NarrativePlan> {
        self.plan.as_ref()
    }

    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    pub fn needs_plan(&self) -> bool {
        self.plan.is_none()
    }

    /// Install a freshly created plan and start at its first chapter.
    pub fn install_plan(&mut self, plan: NarrativePlan) {
        self.plan = Some(plan);
        self.chapter_index = 0;
    }

    /// Pick the next chapter, pivoting once the plan is exhausted.
    ///
    /// On pivot the topic becomes the plan's `next_pivot_topic` and the plan
    /// is discarded, so the next cycle plans again.
    pub fn select(&mut self) -> Option<Selection> {
        let plan = self.plan.as_ref()?;
        if let Some(title) = plan.chapters.get(self.chapter_index) {
            return Some(Selection::Chapter {
                index: self.chapter_index,
                title: title.clone(),
            });
        }

        let to = plan.next_pivot_topic.clone();
        let from = std::mem::replace(&mut self.topic, to.clone());
        self.plan = None;
        self.chapter_index = 0;
        Some(Selection::Pivot { from, to })
    }

    /// Move past the current chapter once its script exists.
    pub fn advance(&mut self) {
        if let Some(plan) = &self.plan {
            self.chapter_index = (self.chapter_index + 1).min(plan.chapters.len());
        }
    }

    /// Main topic the current plan narrates, falling back to the requested topic.
    pub fn main_topic(&self) -> &str {
        self.plan
            .as_ref()
            .map(|plan| plan.main_topic.as_str())
            .filter(|topic| !topic.is_empty())
            .unwrap_or(&self.topic)
    }

    /// Continuity context handed to the write step.
    ///
    /// Always names the story; the first chapter has no predecessor.
    pub fn writing_context(&self) -> String {
        let previous = self
            .plan
            .as_ref()
            .zip(self.chapter_index.checked_sub(1))
            .and_then(|(plan, index)| plan.chapters.get(index))
            .map_or("Beginning of the story", String::as_str);
        format!(
            "Overall story: {}. Previous chapter: {previous}",
            self.main_topic()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rome() -> NarrativePlan {
        NarrativePlan {
            main_topic: "The Fall of Rome".into(),
            chapters: vec!["Omens".into(), "The Sack".into()],
            next_pivot_topic: "Byzantine Empire".into(),
        }
    }

    #[test]
    fn test_new_state_needs_plan() {
        let mut state = PipelineState::new("The Fall of Rome");
        assert!(state.needs_plan());
        assert_eq!(state.select(), None);
        assert_eq!(state.main_topic(), "The Fall of Rome");
    }

    #[test]
    fn test_chapters_are_selected_in_order() {
        let mut state = PipelineState::new("The Fall of Rome");
        state.install_plan(rome());

        assert_eq!(
            state.select(),
            Some(Selection::Chapter {
                index: 0,
                title: "Omens".into()
            })
        );
        // Selecting without advancing repeats the chapter
        assert_eq!(
            state.select(),
            Some(Selection::Chapter {
                index: 0,
                title: "Omens".into()
            })
        );

        state.advance();
        assert_eq!(
            state.select(),
            Some(Selection::Chapter {
                index: 1,
                title: "The Sack".into()
            })
        );
    }

    #[test]
    fn test_exhausted_plan_pivots_to_next_topic() {
        let mut state = PipelineState::new("The Fall of Rome");
        state.install_plan(rome());
        state.advance();
        state.advance();

        assert_eq!(
            state.select(),
            Some(Selection::Pivot {
                from: "The Fall of Rome".into(),
                to: "Byzantine Empire".into()
            })
        );
        assert_eq!(state.topic(), "Byzantine Empire");
        assert!(state.needs_plan());
        assert_eq!(state.chapter_index(), 0);
    }

    #[test]
    fn test_advance_never_passes_chapter_count() {
        let mut state = PipelineState::new("Rome");
        state.install_plan(rome());
        for _ in 0..5 {
            state.advance();
        }
        assert_eq!(state.chapter_index(), 2);
    }

    #[test]
    fn test_advance_without_plan_is_noop() {
        let mut state = PipelineState::new("Rome");
        state.advance();
        assert_eq!(state.chapter_index(), 0);
    }

    #[test]
    fn test_install_plan_resets_index() {
        let mut state = PipelineState::new("Rome");
        state.install_plan(rome());
        state.advance();
        state.install_plan(rome());
        assert_eq!(state.chapter_index(), 0);
    }

    #[test]
    fn test_writing_context_for_first_chapter() {
        let mut state = PipelineState::new("Rome");
        assert_eq!(
            state.writing_context(),
            "Overall story: Rome. Previous chapter: Beginning of the story"
        );
        state.install_plan(rome());
        assert_eq!(
            state.writing_context(),
            "Overall story: The Fall of Rome. Previous chapter: Beginning of the story"
        );
    }

    #[test]
    fn test_writing_context_names_previous_chapter() {
        let mut state = PipelineState::new("Rome");
        state.install_plan(rome());
        state.advance();
        assert_eq!(
            state.writing_context(),
            "Overall story: The Fall of Rome. Previous chapter: Omens"
        );
    }

    #[test]
    fn test_main_topic_prefers_plan() {
        let mut state = PipelineState::new("rome please");
        state.install_plan(rome());
        assert_eq!(state.main_topic(), "The Fall of Rome");
    }
}
