//! Ordered intent rule table.
//!
//! One table answers both questions asked of a message body: should it start
//! a session at all, and what kind of session. Rules are evaluated once, in
//! declaration order, and the first match wins:
//!
//! 1. direct mention of this instance → `interactive`
//! 2. `/task ...` command → `task`
//! 3. `/research ...` command → `research`
//! 4. topical keyword → `philosophical`
//!
//! A body that matches nothing does not trigger. `classify` on such a body
//! falls back to `general` with the raw body as payload.

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::{Intent, TaskType};

/// Built-in keywords for the topical (philosophical) domain.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "consciousness",
    "conscious",
    "sentience",
    "sentient",
    "qualia",
    "phenomenology",
    "phenomenological",
    "subjective experience",
    "self-awareness",
    "free will",
    "hard problem",
    "philosophy",
    "philosophical",
    "existential",
    "meaning of life",
];

/// How a rule recognizes its messages and extracts the payload.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Body contains a mention token; the token is cut out of the payload.
    Mention(Regex),
    /// Body begins with a command; the payload is the remainder.
    Command(Regex),
    /// Body contains a keyword; the payload is the raw body.
    Keywords(Regex),
}

impl Matcher {
    fn extract(&self, body: &str) -> Option<String> {
        match self {
            Self::Mention(re) => {
                let token = re.captures(body)?.get(1)?;
                let before = body[..token.start()].trim_end();
                let after = body[token.end()..]
                    .trim_start_matches(|c: char| c == ':' || c == ',' || c.is_whitespace())
                    .trim_end();
                Some(match (before.is_empty(), after.is_empty()) {
                    (true, _) => after.to_string(),
                    (false, true) => before.to_string(),
                    (false, false) => format!("{before} {after}"),
                })
            }
            Self::Command(re) => {
                let caps = re.captures(body)?;
                Some(
                    caps.get(1)
                        .map(|m| m.as_str().trim().to_string())
                        .unwrap_or_default(),
                )
            }
            Self::Keywords(re) => re.is_match(body).then(|| body.to_string()),
        }
    }
}

/// A single entry in the rule table.
#[derive(Debug, Clone)]
pub struct IntentRule {
    /// Human-readable rule name for logging.
    pub name: String,
    pub task_type: TaskType,
    pub matcher: Matcher,
}

/// Ordered intent classifier.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    self_id: String,
    rules: Vec<IntentRule>,
}

impl RulesEngine {
    /// Build the standard four-rule table.
    ///
    /// `mention_tokens` are matched case-insensitively and must stand alone
    /// (`@aria` does not match inside `@ariadne`). An empty `keywords` list
    /// selects [`DEFAULT_KEYWORDS`].
    pub fn new(
        self_id: &str,
        mention_tokens: &[String],
        keywords: &[String],
    ) -> Result<Self, regex::Error> {
        let mut rules = Vec::new();

        let mut tokens: Vec<&str> = mention_tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        // Longest first so a full user ID wins over its localpart.
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        tokens.dedup();
        if !tokens.is_empty() {
            let alternation = tokens
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            rules.push(IntentRule {
                name: "direct mention".into(),
                task_type: TaskType::Interactive,
                matcher: Matcher::Mention(Regex::new(&format!(
                    r"(?i)(?:^|[^\w@])({alternation})(?:[^\w-]|$)"
                ))?),
            });
        }

        rules.push(IntentRule {
            name: "/task command".into(),
            task_type: TaskType::Task,
            matcher: Matcher::Command(Regex::new(r"(?is)^\s*/task(?:\s+(.*))?$")?),
        });
        rules.push(IntentRule {
            name: "/research command".into(),
            task_type: TaskType::Research,
            matcher: Matcher::Command(Regex::new(r"(?is)^\s*/research(?:\s+(.*))?$")?),
        });

        let keywords: Vec<String> = if keywords.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            keywords.to_vec()
        };
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k.trim()))
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        if !alternation.is_empty() {
            rules.push(IntentRule {
                name: "topical keyword".into(),
                task_type: TaskType::Philosophical,
                matcher: Matcher::Keywords(Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?),
            });
        }

        Ok(Self {
            self_id: self_id.to_string(),
            rules,
        })
    }

    /// Mention tokens derived from a Matrix user ID: the full ID and `@localpart`.
    pub fn mention_tokens_for(user_id: &str) -> Vec<String> {
        let mut tokens = vec![user_id.to_string()];
        if let Some((localpart, _server)) = user_id.split_once(':') {
            tokens.push(localpart.to_string());
        }
        tokens
    }

    /// The dispatcher's own identity; its messages never trigger.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Evaluate the rule table. Returns the first matching intent.
    pub fn evaluate(&self, body: &str) -> Option<Intent> {
        for rule in &self.rules {
            if let Some(content) = rule.matcher.extract(body) {
                debug!(rule = %rule.name, task_type = %rule.task_type, "Message matched rule");
                return Some(Intent::new(rule.task_type, content));
            }
        }
        None
    }

    /// Should this message start a session at all?
    pub fn should_trigger(&self, sender: &str, body: &str) -> bool {
        sender != self.self_id && self.evaluate(body).is_some()
    }

    /// Task type and payload for a body, falling back to `general`.
    pub fn classify(&self, body: &str) -> Intent {
        self.evaluate(body)
            .unwrap_or_else(|| Intent::new(TaskType::General, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELF_ID: &str = "@aria:matrix.org";

    fn engine() -> RulesEngine {
        RulesEngine::new(SELF_ID, &RulesEngine::mention_tokens_for(SELF_ID), &[]).unwrap()
    }

    #[test]
    fn mention_tokens_from_user_id() {
        assert_eq!(
            RulesEngine::mention_tokens_for("@aria:matrix.org"),
            vec!["@aria:matrix.org", "@aria"]
        );
        assert_eq!(RulesEngine::mention_tokens_for("aria"), vec!["aria"]);
    }

    #[test]
    fn task_command_strips_prefix() {
        let intent = engine().classify("/task summarize the log");
        assert_eq!(intent, Intent::new(TaskType::Task, "summarize the log"));
    }

    #[test]
    fn research_command_strips_prefix() {
        let intent = engine().classify("  /research   integrated information theory\n");
        assert_eq!(intent.task_type, TaskType::Research);
        assert_eq!(intent.content, "integrated information theory");
    }

    #[test]
    fn command_requires_word_boundary() {
        let engine = engine();
        assert!(engine.evaluate("/tasks are piling up").is_none());
        assert!(engine.evaluate("please /task this").is_none());
    }

    #[test]
    fn bare_command_has_empty_payload() {
        let intent = engine().classify("/task");
        assert_eq!(intent, Intent::new(TaskType::Task, ""));
    }

    #[test]
    fn mention_is_cut_from_payload() {
        let engine = engine();
        assert_eq!(
            engine.classify("@aria: what's the status?"),
            Intent::new(TaskType::Interactive, "what's the status?")
        );
        assert_eq!(
            engine.classify("hey @aria, check the build"),
            Intent::new(TaskType::Interactive, "hey check the build")
        );
        assert_eq!(
            engine.classify("ping @aria:matrix.org"),
            Intent::new(TaskType::Interactive, "ping")
        );
    }

    #[test]
    fn mention_is_case_insensitive_and_standalone() {
        let engine = engine();
        assert_eq!(
            engine.evaluate("@ARIA hello").map(|i| i.task_type),
            Some(TaskType::Interactive)
        );
        assert!(engine.evaluate("@ariadne hello").is_none());
        assert!(engine.evaluate("mail bob@aria.example").is_none());
    }

    #[test]
    fn keyword_keeps_raw_body() {
        let intent = engine().classify("  Do you think qualia are real?\n");
        assert_eq!(intent.task_type, TaskType::Philosophical);
        assert_eq!(intent.content, "  Do you think qualia are real?\n");
    }

    #[test]
    fn keyword_needs_whole_word() {
        assert!(engine().evaluate("unconsciousnessless").is_none());
    }

    #[test]
    fn mention_beats_keyword() {
        let intent = engine().classify("@aria what is consciousness?");
        assert_eq!(intent.task_type, TaskType::Interactive);
    }

    #[test]
    fn mention_beats_command() {
        let intent = engine().classify("/task ask @aria about it");
        assert_eq!(intent.task_type, TaskType::Interactive);
    }

    #[test]
    fn command_beats_keyword() {
        let intent = engine().classify("/research consciousness in LLMs");
        assert_eq!(intent, Intent::new(TaskType::Research, "consciousness in LLMs"));
    }

    #[test]
    fn unmatched_falls_back_to_general() {
        let engine = engine();
        assert!(!engine.should_trigger("@thomas:matrix.org", "hello"));
        assert_eq!(engine.classify(" hello "), Intent::new(TaskType::General, " hello "));
    }

    #[test]
    fn trigger_and_classify_agree() {
        let engine = engine();
        let bodies = [
            "hello",
            "/task x",
            "/research y",
            "@aria z",
            "free will?",
            "/tasks",
        ];
        for body in bodies {
            let triggered = engine.should_trigger("@thomas:matrix.org", body);
            let general = engine.classify(body).task_type == TaskType::General;
            assert_eq!(triggered, !general, "disagreement on {body:?}");
        }
    }

    #[test]
    fn never_triggers_on_own_messages() {
        assert!(!engine().should_trigger(SELF_ID, "/task loop forever"));
    }

    #[test]
    fn custom_keywords_replace_defaults() {
        let engine = RulesEngine::new(SELF_ID, &[], &["ethics".to_string()]).unwrap();
        assert!(engine.evaluate("what about consciousness").is_none());
        assert_eq!(
            engine.evaluate("a question of ethics").map(|i| i.task_type),
            Some(TaskType::Philosophical)
        );
    }

    #[test]
    fn rule_order_is_fixed() {
        let names: Vec<TaskType> = engine().rules().iter().map(|r| r.task_type).collect();
        assert_eq!(
            names,
            vec![
                TaskType::Interactive,
                TaskType::Task,
                TaskType::Research,
                TaskType::Philosophical
            ]
        );
    }
}
