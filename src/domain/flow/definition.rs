//! Authoring format for flows.
//!
//! Flow authors reference steps and slots by slug; ids are generated when
//! the definition is turned into a `FlowGraph`. Connections are written as
//! `"step.output"` → `"step.input"`.
//!
//! ```yaml
//! id: 0b7d3f0e-5d0c-4a43-9a55-2f1f2f1d9a10
//! name: Lead qualification
//! steps:
//!   - slug: greeting
//!     name: Greeting
//!     first: true
//!     questions:
//!       - { slug: name, text: "What is your name?" }
//!     outputs:
//!       - { slug: next, name: Next }
//!   - slug: budget
//!     name: Budget
//!     inputs:
//!       - { slug: from-greeting, name: From greeting, type: fully_completed }
//! connections:
//!   - { from: greeting.next, to: budget.from-greeting }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, TreeFlowId};

use super::graph::FlowGraph;
use super::step::{
    Connection, Input, InputType, Output, OutputCondition, Question, Step, DEFAULT_MAX_ATTEMPTS,
};

/// Serialized flow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub questions: Vec<QuestionDefinition>,
    #[serde(default)]
    pub inputs: Vec<InputDefinition>,
    #[serde(default)]
    pub outputs: Vec<OutputDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDefinition {
    pub slug: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDefinition {
    pub slug: String,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputKind,
    /// Only meaningful for `not_completed_after_attempts`.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Input type names as written by authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    FullyCompleted,
    NotCompletedAfterAttempts,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub condition: OutputCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    /// `step_slug.output_slug`
    pub from: String,
    /// `step_slug.input_slug`
    pub to: String,
}

impl FlowDefinition {
    /// Parses a YAML document.
    pub fn from_yaml(source: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(source)
            .map_err(|e| DomainError::invalid_flow(format!("Invalid flow YAML: {}", e)))
    }

    /// Builds the graph using the given default attempt threshold.
    pub fn into_graph(self, default_max_attempts: u32) -> Result<FlowGraph, DomainError> {
        let steps: Vec<Step> = self
            .steps
            .into_iter()
            .map(|def| build_step(def, default_max_attempts))
            .collect::<Result<_, _>>()?;

        let connections = self
            .connections
            .iter()
            .map(|def| resolve_connection(&steps, def))
            .collect::<Result<Vec<_>, _>>()?;

        FlowGraph::new(TreeFlowId::from_uuid(self.id), self.name, steps, connections)
    }
}

impl TryFrom<FlowDefinition> for FlowGraph {
    type Error = DomainError;

    fn try_from(definition: FlowDefinition) -> Result<Self, Self::Error> {
        definition.into_graph(DEFAULT_MAX_ATTEMPTS)
    }
}

fn build_step(def: StepDefinition, default_max_attempts: u32) -> Result<Step, DomainError> {
    let mut step = Step::new(def.slug, def.name);
    step.first = def.first;
    step.questions = def
        .questions
        .into_iter()
        .map(|q| Question::new(q.slug, q.text))
        .collect();

    for input in def.inputs {
        let input_type = match input.input_type {
            InputKind::FullyCompleted => InputType::FullyCompleted,
            InputKind::Any => InputType::Any,
            InputKind::NotCompletedAfterAttempts => {
                let max_attempts = input.max_attempts.unwrap_or(default_max_attempts);
                if max_attempts == 0 {
                    return Err(DomainError::invalid_flow("max_attempts must be at least 1")
                        .with_detail("step_slug", step.slug.clone())
                        .with_detail("input_slug", input.slug));
                }
                InputType::NotCompletedAfterAttempts { max_attempts }
            }
        };
        step.inputs.push(Input::new(input.slug, input.name, input_type));
    }

    step.outputs = def
        .outputs
        .into_iter()
        .map(|o| Output::new(o.slug, o.name).when(o.condition))
        .collect();

    Ok(step)
}

fn resolve_connection(
    steps: &[Step],
    def: &ConnectionDefinition,
) -> Result<Connection, DomainError> {
    let (from_step, output_slug) = split_reference(&def.from)?;
    let (to_step, input_slug) = split_reference(&def.to)?;

    let output = steps
        .iter()
        .find(|s| s.slug == from_step)
        .and_then(|s| s.output(output_slug))
        .ok_or_else(|| {
            DomainError::invalid_flow("Connection source output not found")
                .with_detail("from", def.from.clone())
        })?;
    let input = steps
        .iter()
        .find(|s| s.slug == to_step)
        .and_then(|s| s.input(input_slug))
        .ok_or_else(|| {
            DomainError::invalid_flow("Connection target input not found")
                .with_detail("to", def.to.clone())
        })?;

    Ok(Connection::new(output.id, input.id))
}

fn split_reference(reference: &str) -> Result<(&str, &str), DomainError> {
    reference
        .split_once('.')
        .filter(|(step, slot)| !step.is_empty() && !slot.is_empty())
        .ok_or_else(|| {
            DomainError::invalid_flow("Connection endpoint must be written as step.slot")
                .with_detail("reference", reference)
        })
}
