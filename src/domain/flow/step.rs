//! Flow graph value types: steps, their questions and routing slots.
//!
//! All types here are immutable snapshots. A `FlowGraph` owns them and hands
//! out shared references; talk progress is never stored on the graph.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{InputId, OutputId, QuestionId, StepId};

/// Default attempt threshold for `not_completed_after_attempts` inputs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A node in the conversation flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Stable identifier used by talk state.
    pub slug: String,
    pub name: String,
    /// Entry point marker. At most one step per flow should carry it.
    pub first: bool,
    /// Questions in the order they should be asked.
    pub questions: Vec<Question>,
    pub inputs: Vec<Input>,
    /// Outputs in declaration order; the first matching output wins.
    pub outputs: Vec<Output>,
}

impl Step {
    /// Creates an empty step.
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            slug: slug.into(),
            name: name.into(),
            first: false,
            questions: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Builder: mark as the flow entry point.
    pub fn as_first(mut self) -> Self {
        self.first = true;
        self
    }

    /// Builder: append a question.
    pub fn with_question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    /// Builder: append an input slot.
    pub fn with_input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    /// Builder: append an output slot.
    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Finds a question by its action slug.
    pub fn question(&self, slug: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.slug == slug)
    }

    /// Finds an input by slug.
    pub fn input(&self, slug: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.slug == slug)
    }

    /// Finds an output by slug.
    pub fn output(&self, slug: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.slug == slug)
    }
}

/// Something the agent should learn from the contact during a step.
///
/// The slug doubles as the "action slug" under which answers are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub slug: String,
    pub text: String,
}

impl Question {
    pub fn new(slug: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: QuestionId::new(),
            slug: slug.into(),
            text: text.into(),
        }
    }
}

/// How an input decides that its step is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputType {
    /// Every question of the step has an answer.
    FullyCompleted,
    /// The step has been attempted `max_attempts` times without finishing.
    NotCompletedAfterAttempts { max_attempts: u32 },
    /// Any single answer on the step.
    Any,
}

impl InputType {
    /// Inputs that must hold for the step's baseline completion.
    ///
    /// Attempt-limited inputs are escape hatches, not requirements.
    pub fn is_required(&self) -> bool {
        !matches!(self, InputType::NotCompletedAfterAttempts { .. })
    }

    /// Stable string form used in persistence and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::FullyCompleted => "fully_completed",
            InputType::NotCompletedAfterAttempts { .. } => "not_completed_after_attempts",
            InputType::Any => "any",
        }
    }
}

/// Incoming routing slot of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub id: InputId,
    pub slug: String,
    pub name: String,
    #[serde(flatten)]
    pub input_type: InputType,
}

impl Input {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, input_type: InputType) -> Self {
        Self {
            id: InputId::new(),
            slug: slug.into(),
            name: name.into(),
            input_type,
        }
    }
}

/// Condition attached to an output; decides whether the output can fire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum OutputCondition {
    /// Fires whenever the step is complete.
    #[default]
    Always,
    /// Fires when the named input of the same step is satisfied.
    InputSatisfied { input: String },
    /// Fires when the latest inbound message contains any keyword.
    MessageContains { keywords: Vec<String> },
    /// Fires when a recorded answer equals the expected value.
    AnswerEquals { action: String, value: String },
}

/// Outgoing routing slot of a step. Connects to at most one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: OutputId,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub condition: OutputCondition,
}

impl Output {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: OutputId::new(),
            slug: slug.into(),
            name: name.into(),
            condition: OutputCondition::Always,
        }
    }

    /// Builder: set the firing condition.
    pub fn when(mut self, condition: OutputCondition) -> Self {
        self.condition = condition;
        self
    }
}

/// Directed edge from an output of one step to an input of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub source_output: OutputId,
    pub target_input: InputId,
}

impl Connection {
    pub fn new(source_output: OutputId, target_input: InputId) -> Self {
        Self {
            source_output,
            target_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_inputs_are_not_required() {
        assert!(InputType::FullyCompleted.is_required());
        assert!(InputType::Any.is_required());
        assert!(!InputType::NotCompletedAfterAttempts { max_attempts: 2 }.is_required());
    }

    #[test]
    fn step_lookups_find_children_by_slug() {
        let step = Step::new("contact", "Contact details")
            .with_question(Question::new("email", "What is your email?"))
            .with_input(Input::new("in", "In", InputType::Any))
            .with_output(Output::new("done", "Done"));

        assert!(step.question("email").is_some());
        assert!(step.input("in").is_some());
        assert!(step.output("done").is_some());
        assert!(step.output("missing").is_none());
    }

    #[test]
    fn input_type_serializes_with_snake_case_tag() {
        let input = Input::new(
            "retry",
            "Retry",
            InputType::NotCompletedAfterAttempts { max_attempts: 4 },
        );
        let json = serde_json::to_value(&input).unwrap();

        assert_eq!(json["type"], "not_completed_after_attempts");
        assert_eq!(json["max_attempts"], 4);
    }

    #[test]
    fn output_condition_defaults_to_always() {
        let json = serde_json::json!({
            "id": OutputId::new(),
            "slug": "next",
            "name": "Next",
        });
        let output: Output = serde_json::from_value(json).unwrap();
        assert_eq!(output.condition, OutputCondition::Always);
    }
}
