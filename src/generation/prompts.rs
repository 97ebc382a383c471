//! Prompt templates sent to the generation service.
//!
//! Templates are plain strings with `{name}` placeholders so a narrator style
//! or language can be swapped in through configuration.

use crate::config::PromptOverrides;

const PLAN_TEMPLATE: &str = "\
You are a master storyteller planning a serialized audio narration.

TOPIC: {topic}

Outline the story as 6 to 8 chapters in chronological order. Chapter titles
should hint at the drama without revealing it. Then suggest one fascinating,
related story to continue with once this one ends.

Respond with JSON: {\"mainTopic\": \"{topic}\", \"chapters\": [...], \"nextPivotTopic\": \"...\"}";

const RESEARCH_TEMPLATE: &str = "\
You are a story researcher.

STORY: {topic}
CURRENT CHAPTER: {chapter}

Find 4-5 vivid, specific details for this chapter: real quotes, turning
points, sensory atmosphere, emotional stakes and surprising connections.
Write them as notes ready to be woven into narration.";

const WRITE_TEMPLATE: &str = "\
You are a legendary storyteller.

STORY CONTEXT: {context}
CURRENT CHAPTER: {chapter}
RAW MATERIAL: {notes}

Write 45 to 90 seconds of immersive spoken narration in the present tense.
Open on an image, not exposition. No greetings, sign-offs or meta-commentary.

Respond with JSON: {\"script\": \"...\", \"displayTitle\": \"a 3-5 word title\"}";

const RESEARCH_FALLBACK: &str = "Research on {chapter}";

/// The full prompt set used by a generation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub plan: String,
    pub research: String,
    pub write: String,
    /// Notes used when research comes back empty.
    pub research_fallback: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            plan: PLAN_TEMPLATE.to_string(),
            research: RESEARCH_TEMPLATE.to_string(),
            write: WRITE_TEMPLATE.to_string(),
            research_fallback: RESEARCH_FALLBACK.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Replace built-in templates with configured ones where present.
    pub fn with_overrides(mut self, overrides: &PromptOverrides) -> Self {
        if let Some(plan) = &overrides.plan {
            self.plan = plan.clone();
        }
        if let Some(research) = &overrides.research {
            self.research = research.clone();
        }
        if let Some(write) = &overrides.write {
            self.write = write.clone();
        }
        if let Some(fallback) = &overrides.research_fallback {
            self.research_fallback = fallback.clone();
        }
        self
    }

    pub fn plan_prompt(&self, topic: &str) -> String {
        render(&self.plan, &[("topic", topic)])
    }

    pub fn research_prompt(&self, chapter: &str, main_topic: &str) -> String {
        render(&self.research, &[("chapter", chapter), ("topic", main_topic)])
    }

    pub fn write_prompt(&self, chapter: &str, notes: &str, context: &str) -> String {
        render(
            &self.write,
            &[("chapter", chapter), ("notes", notes), ("context", context)],
        )
    }

    pub fn research_fallback(&self, chapter: &str) -> String {
        render(&self.research_fallback, &[("chapter", chapter)])
    }
}

/// Substitute `{name}` placeholders in one pass.
///
/// Substituted values are never re-scanned, so notes containing braces
/// survive untouched. Unknown placeholders are left as written.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_known_placeholders() {
        assert_eq!(
            render("{a} and {b}", &[("a", "x"), ("b", "y")]),
            "x and y"
        );
    }

    #[test]
    fn test_render_keeps_unknown_placeholders_and_json_braces() {
        assert_eq!(
            render("{\"k\": \"{a}\"} {missing}", &[("a", "v")]),
            "{\"k\": \"v\"} {missing}"
        );
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        assert_eq!(render("{a}", &[("a", "{a}")]), "{a}");
    }

    #[test]
    fn test_plan_prompt_contains_topic() {
        let prompts = PromptTemplates::default();
        let prompt = prompts.plan_prompt("The Fall of Rome");
        assert!(prompt.contains("TOPIC: The Fall of Rome"));
        assert!(prompt.contains("\"mainTopic\": \"The Fall of Rome\""));
    }

    #[test]
    fn test_write_prompt_contains_all_inputs() {
        let prompts = PromptTemplates::default();
        let prompt = prompts.write_prompt("The Sack", "Alaric waits", "Overall story: Rome");
        assert!(prompt.contains("CURRENT CHAPTER: The Sack"));
        assert!(prompt.contains("RAW MATERIAL: Alaric waits"));
        assert!(prompt.contains("STORY CONTEXT: Overall story: Rome"));
    }

    #[test]
    fn test_research_fallback_names_chapter() {
        let prompts = PromptTemplates::default();
        assert_eq!(prompts.research_fallback("Omens"), "Research on Omens");
    }

    #[test]
    fn test_overrides_replace_only_given_templates() {
        let overrides = PromptOverrides {
            research_fallback: Some("Recherche sur {chapter}".to_string()),
            ..Default::default()
        };
        let prompts = PromptTemplates::default().with_overrides(&overrides);
        assert_eq!(prompts.research_fallback("Omens"), "Recherche sur Omens");
        assert_eq!(prompts.plan, PLAN_TEMPLATE);
    }
}
