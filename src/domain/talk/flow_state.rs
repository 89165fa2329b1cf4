//! Per-talk progress through a flow.
//!
//! Stored alongside the talk. Read access is public; every mutation goes
//! through `TalkFlowService`, which is the only writer of the current step.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{TalkMessageId, Timestamp};

/// One step-to-step transition recorded for a talk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTransition {
    pub step_slug: String,
    /// Output that fired. `None` when the step declared no outputs.
    pub output_slug: Option<String>,
    /// Step entered next. `None` ends the flow.
    pub next_step_slug: Option<String>,
    pub at: Timestamp,
}

/// Progress of one talk through its flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkFlowState {
    current_step_slug: Option<String>,
    /// step slug -> action slug -> answer
    #[serde(default)]
    answers: BTreeMap<String, BTreeMap<String, String>>,
    /// step slug -> inbound messages processed while on that step
    #[serde(default)]
    attempts: BTreeMap<String, BTreeSet<TalkMessageId>>,
    #[serde(default)]
    transitions: Vec<StepTransition>,
    #[serde(default)]
    finished: bool,
}

impl TalkFlowState {
    pub fn current_step_slug(&self) -> Option<&str> {
        self.current_step_slug.as_deref()
    }

    /// Answers recorded for a step, keyed by action slug.
    pub fn answers_for(&self, step_slug: &str) -> Option<&BTreeMap<String, String>> {
        self.answers.get(step_slug)
    }

    /// Single recorded answer.
    pub fn answer(&self, step_slug: &str, action_slug: &str) -> Option<&str> {
        self.answers
            .get(step_slug)
            .and_then(|a| a.get(action_slug))
            .map(String::as_str)
    }

    /// Number of recorded answers for a step.
    pub fn answer_count(&self, step_slug: &str) -> usize {
        self.answers.get(step_slug).map_or(0, BTreeMap::len)
    }

    pub fn attempts_for(&self, step_slug: &str) -> u32 {
        self.attempts
            .get(step_slug)
            .map_or(0, |messages| messages.len() as u32)
    }

    pub fn transitions(&self) -> &[StepTransition] {
        &self.transitions
    }

    /// True once a transition without a next step has been recorded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True when the talk has never been positioned on a step.
    pub fn is_new(&self) -> bool {
        self.current_step_slug.is_none() && !self.finished && self.transitions.is_empty()
    }

    pub(super) fn set_current_step(&mut self, step_slug: Option<String>) {
        self.current_step_slug = step_slug;
    }

    pub(super) fn upsert_answer(&mut self, step_slug: &str, action_slug: &str, answer: String) {
        self.answers
            .entry(step_slug.to_string())
            .or_default()
            .insert(action_slug.to_string(), answer);
    }

    /// Counts `message_id` once against a step; repeats are ignored.
    pub(super) fn add_attempt(&mut self, step_slug: &str, message_id: TalkMessageId) -> u32 {
        let messages = self.attempts.entry(step_slug.to_string()).or_default();
        messages.insert(message_id);
        messages.len() as u32
    }

    pub(super) fn push_transition(&mut self, transition: StepTransition) {
        if transition.next_step_slug.is_none() {
            self.finished = true;
        }
        self.transitions.push(transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_new() {
        let state = TalkFlowState::default();
        assert!(state.is_new());
        assert!(!state.is_finished());
        assert_eq!(state.attempts_for("greeting"), 0);
    }

    #[test]
    fn upsert_overwrites_existing_answer() {
        let mut state = TalkFlowState::default();
        state.upsert_answer("greeting", "name", "Ana".to_string());
        state.upsert_answer("greeting", "name", "Ana Maria".to_string());

        assert_eq!(state.answer_count("greeting"), 1);
        assert_eq!(state.answer("greeting", "name"), Some("Ana Maria"));
    }

    #[test]
    fn same_message_counts_once_per_step() {
        let mut state = TalkFlowState::default();
        let first = TalkMessageId::new();

        assert_eq!(state.add_attempt("budget", first), 1);
        assert_eq!(state.add_attempt("budget", first), 1);
        assert_eq!(state.add_attempt("budget", TalkMessageId::new()), 2);
        assert_eq!(state.attempts_for("budget"), 2);
        assert_eq!(state.attempts_for("greeting"), 0);
    }

    #[test]
    fn terminal_transition_marks_finished() {
        let mut state = TalkFlowState::default();
        state.push_transition(StepTransition {
            step_slug: "greeting".to_string(),
            output_slug: Some("bye".to_string()),
            next_step_slug: None,
            at: Timestamp::now(),
        });

        assert!(state.is_finished());
        assert!(!state.is_new());
    }

    #[test]
    fn deserializes_from_minimal_json() {
        let state: TalkFlowState =
            serde_json::from_str(r#"{"current_step_slug":"greeting"}"#).unwrap();
        assert_eq!(state.current_step_slug(), Some("greeting"));
        assert!(state.transitions().is_empty());
    }
}
