//! TreeFlowExecutionService - picks the output that fires for a talk.
//!
//! Outputs of the current step are evaluated in declaration order and the
//! first one whose condition holds wins.

use serde::Serialize;

use crate::domain::flow::{FlowGraph, Output, OutputCondition, Step};
use crate::domain::foundation::{DomainError, ErrorCode};

use super::flow_service::TalkFlowService;
use super::talk::Talk;

/// Outcome of routing the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSelection {
    /// Step the selection was made for.
    pub step_slug: String,
    /// Winning output. `None` when the step declares no outputs.
    pub output_slug: Option<String>,
    /// Target of the winning output's connection. `None` ends the flow.
    pub next_step_slug: Option<String>,
}

impl StepSelection {
    pub fn is_terminal(&self) -> bool {
        self.next_step_slug.is_none()
    }
}

/// Stateless condition evaluator over one flow snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TreeFlowExecutionService<'g> {
    flow: TalkFlowService<'g>,
}

impl<'g> TreeFlowExecutionService<'g> {
    pub fn new(graph: &'g FlowGraph) -> Self {
        Self {
            flow: TalkFlowService::new(graph),
        }
    }

    /// Selects the output that fires on the talk's current step.
    ///
    /// # Errors
    ///
    /// - `NoCurrentStep` if the talk is not positioned on a known step
    /// - `NoMatchingOutput` if the step has outputs but none of them holds
    pub fn evaluate_and_select_next_step(
        &self,
        talk: &Talk,
        latest_message_body: &str,
    ) -> Result<StepSelection, DomainError> {
        let step = self.flow.get_current_step(talk).ok_or_else(|| {
            DomainError::new(ErrorCode::NoCurrentStep, "Talk has no current step")
                .with_detail("talk_id", talk.id().to_string())
        })?;

        if step.outputs.is_empty() {
            return Ok(StepSelection {
                step_slug: step.slug.clone(),
                output_slug: None,
                next_step_slug: None,
            });
        }

        let output = step
            .outputs
            .iter()
            .find(|output| self.condition_holds(talk, step, output, latest_message_body))
            .ok_or_else(|| {
                DomainError::new(ErrorCode::NoMatchingOutput, "No output condition holds")
                    .with_detail("talk_id", talk.id().to_string())
                    .with_detail("step_slug", step.slug.clone())
            })?;

        Ok(StepSelection {
            step_slug: step.slug.clone(),
            output_slug: Some(output.slug.clone()),
            next_step_slug: self
                .flow
                .graph()
                .target_step_of(&output.id)
                .map(|target| target.slug.clone()),
        })
    }

    fn condition_holds(&self, talk: &Talk, step: &Step, output: &Output, body: &str) -> bool {
        match &output.condition {
            OutputCondition::Always => true,
            OutputCondition::InputSatisfied { input } => step
                .input(input)
                .is_some_and(|input| self.flow.is_input_satisfied(talk, step, input)),
            OutputCondition::MessageContains { keywords } => {
                let body = body.to_lowercase();
                keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .any(|k| !k.is_empty() && body.contains(&k))
            }
            OutputCondition::AnswerEquals { action, value } => talk
                .flow_state()
                .answer(&step.slug, action)
                .is_some_and(|answer| {
                    answer.trim().to_lowercase() == value.trim().to_lowercase()
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::{Connection, Input, InputType, Question};
    use crate::domain::foundation::{OrganizationId, TalkId, TalkMessageId, TreeFlowId};

    struct Fixture {
        flow: FlowGraph,
    }

    impl Fixture {
        /// qualify(first) has outputs in order:
        ///   urgent  (message contains "urgent")  -> escalate
        ///   big     (answer size == "large")     -> sales
        ///   tried   (give-up input satisfied)    -> unconnected
        fn new() -> Self {
            let qualify = Step::new("qualify", "Qualify")
                .as_first()
                .with_question(Question::new("size", "Company size?"))
                .with_input(Input::new(
                    "give-up",
                    "Give up",
                    InputType::NotCompletedAfterAttempts { max_attempts: 1 },
                ))
                .with_output(Output::new("urgent", "Urgent").when(
                    OutputCondition::MessageContains {
                        keywords: vec!["Urgent".to_string()],
                    },
                ))
                .with_output(Output::new("big", "Big").when(OutputCondition::AnswerEquals {
                    action: "size".to_string(),
                    value: "large".to_string(),
                }))
                .with_output(Output::new("tried", "Tried").when(
                    OutputCondition::InputSatisfied {
                        input: "give-up".to_string(),
                    },
                ));
            let escalate = Step::new("escalate", "Escalate")
                .with_input(Input::new("in", "In", InputType::Any));
            let sales = Step::new("sales", "Sales").with_input(Input::new("in", "In", InputType::Any));
            let connections = vec![
                Connection::new(qualify.outputs[0].id, escalate.inputs[0].id),
                Connection::new(qualify.outputs[1].id, sales.inputs[0].id),
            ];
            let flow = FlowGraph::new(
                TreeFlowId::new(),
                "Routing",
                vec![qualify, escalate, sales],
                connections,
            )
            .unwrap();
            Self { flow }
        }

        fn talk(&self) -> Talk {
            let mut talk = Talk::new(TalkId::new(), OrganizationId::new(), Some(self.flow.id()));
            TalkFlowService::new(&self.flow).enter_flow(&mut talk);
            talk
        }

        fn select(&self, talk: &Talk, body: &str) -> Result<StepSelection, DomainError> {
            TreeFlowExecutionService::new(&self.flow).evaluate_and_select_next_step(talk, body)
        }
    }

    #[test]
    fn first_matching_output_wins() {
        let fx = Fixture::new();
        let mut talk = fx.talk();
        TalkFlowService::new(&fx.flow)
            .record_action_answer(&mut talk, "qualify", "size", "Large ")
            .unwrap();

        let selection = fx.select(&talk, "this is URGENT please").unwrap();

        assert_eq!(selection.output_slug.as_deref(), Some("urgent"));
        assert_eq!(selection.next_step_slug.as_deref(), Some("escalate"));
    }

    #[test]
    fn answer_comparison_ignores_case_and_whitespace() {
        let fx = Fixture::new();
        let mut talk = fx.talk();
        TalkFlowService::new(&fx.flow)
            .record_action_answer(&mut talk, "qualify", "size", "  LARGE")
            .unwrap();

        let selection = fx.select(&talk, "we have 500 people").unwrap();

        assert_eq!(selection.output_slug.as_deref(), Some("big"));
        assert_eq!(selection.next_step_slug.as_deref(), Some("sales"));
    }

    #[test]
    fn unconnected_output_is_terminal() {
        let fx = Fixture::new();
        let mut talk = fx.talk();
        TalkFlowService::new(&fx.flow)
            .record_attempt(&mut talk, "qualify", TalkMessageId::new())
            .unwrap();

        let selection = fx.select(&talk, "hello").unwrap();

        assert_eq!(selection.output_slug.as_deref(), Some("tried"));
        assert!(selection.is_terminal());
    }

    #[test]
    fn no_matching_output_is_reported() {
        let fx = Fixture::new();
        let talk = fx.talk();

        let err = fx.select(&talk, "hello").unwrap_err();

        assert_eq!(err.code, ErrorCode::NoMatchingOutput);
    }

    #[test]
    fn talk_outside_flow_has_no_current_step() {
        let fx = Fixture::new();
        let talk = Talk::new(TalkId::new(), OrganizationId::new(), Some(fx.flow.id()));

        let err = fx.select(&talk, "hello").unwrap_err();

        assert_eq!(err.code, ErrorCode::NoCurrentStep);
    }

    #[test]
    fn step_without_outputs_ends_flow() {
        let only = Step::new("only", "Only").as_first();
        let flow = FlowGraph::new(TreeFlowId::new(), "f", vec![only], vec![]).unwrap();
        let mut talk = Talk::new(TalkId::new(), OrganizationId::new(), Some(flow.id()));
        TalkFlowService::new(&flow).enter_flow(&mut talk);

        let selection = TreeFlowExecutionService::new(&flow)
            .evaluate_and_select_next_step(&talk, "bye")
            .unwrap();

        assert_eq!(selection.output_slug, None);
        assert!(selection.is_terminal());
    }
}
