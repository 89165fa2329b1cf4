//! TalkFlowService - tracks where a talk stands in its flow.
//!
//! The service borrows an immutable `FlowGraph` snapshot and mutates only the
//! talk's `TalkFlowState`. `enter_flow` and `complete_step` are the only code
//! paths that move the current step.

use crate::domain::flow::{FlowGraph, Input, InputType, Step};
use crate::domain::foundation::{DomainError, ErrorCode, TalkMessageId, Timestamp};

use super::flow_state::StepTransition;
use super::talk::Talk;

/// Per-talk flow state tracker bound to one flow snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TalkFlowService<'g> {
    graph: &'g FlowGraph,
}

impl<'g> TalkFlowService<'g> {
    pub fn new(graph: &'g FlowGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'g FlowGraph {
        self.graph
    }

    /// Current step of the talk.
    ///
    /// `None` for a talk that has not entered its flow, a finished talk, or a
    /// talk whose recorded step was removed from the flow since.
    pub fn get_current_step(&self, talk: &Talk) -> Option<&'g Step> {
        talk.flow_state()
            .current_step_slug()
            .and_then(|slug| self.graph.find_step_by_slug(slug))
    }

    /// Slug of the current step, resolved against the flow.
    pub fn get_current_step_slug(&self, talk: &Talk) -> Option<&'g str> {
        self.get_current_step(talk).map(|step| step.slug.as_str())
    }

    /// Positions a talk that never entered its flow on the first step.
    ///
    /// Talks already in (or past) the flow are left untouched. Returns the
    /// current step afterwards; `None` when the flow has no unique first step.
    pub fn enter_flow(&self, talk: &mut Talk) -> Option<&'g Step> {
        if !talk.flow_state().is_new() {
            return self.get_current_step(talk);
        }

        let first = self.graph.first_step()?;
        talk.flow_state_mut()
            .set_current_step(Some(first.slug.clone()));
        Some(first)
    }

    /// True when the input's own condition holds for the talk.
    pub fn is_input_satisfied(&self, talk: &Talk, step: &Step, input: &Input) -> bool {
        let state = talk.flow_state();
        match input.input_type {
            InputType::FullyCompleted => all_questions_answered(talk, step),
            InputType::Any => state.answer_count(&step.slug) > 0,
            InputType::NotCompletedAfterAttempts { max_attempts } => {
                state.attempts_for(&step.slug) >= max_attempts
            }
        }
    }

    /// Whether the step has gathered enough to move on.
    ///
    /// Required inputs (`fully_completed`, `any`) must all hold; a step
    /// without required inputs needs every question answered. Independently,
    /// any `not_completed_after_attempts` input that reached its threshold
    /// completes the step. Unknown steps are never complete.
    pub fn is_step_complete(&self, talk: &Talk, step_slug: &str) -> bool {
        let Some(step) = self.graph.find_step_by_slug(step_slug) else {
            return false;
        };

        let mut required = step
            .inputs
            .iter()
            .filter(|input| input.input_type.is_required())
            .peekable();
        let baseline = if required.peek().is_some() {
            required.all(|input| self.is_input_satisfied(talk, step, input))
        } else {
            all_questions_answered(talk, step)
        };

        baseline
            || step
                .inputs
                .iter()
                .filter(|input| !input.input_type.is_required())
                .any(|input| self.is_input_satisfied(talk, step, input))
    }

    /// Records (or overwrites) one answer for an action of a step.
    pub fn record_action_answer(
        &self,
        talk: &mut Talk,
        step_slug: &str,
        action_slug: &str,
        answer: &str,
    ) -> Result<(), DomainError> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(DomainError::validation("answer", "Answer cannot be empty")
                .with_detail("action_slug", action_slug));
        }
        if action_slug.trim().is_empty() {
            return Err(DomainError::validation(
                "action_slug",
                "Action slug cannot be empty",
            ));
        }
        let step = self.require_step(step_slug)?;

        talk.flow_state_mut()
            .upsert_answer(&step.slug, action_slug, answer.to_string());
        Ok(())
    }

    /// Counts one processed inbound message against a step.
    ///
    /// Recording the same message again leaves the count unchanged, so a
    /// redelivered command cannot exhaust an attempt threshold early.
    pub fn record_attempt(
        &self,
        talk: &mut Talk,
        step_slug: &str,
        message_id: TalkMessageId,
    ) -> Result<u32, DomainError> {
        let step = self.require_step(step_slug)?;
        Ok(talk.flow_state_mut().add_attempt(&step.slug, message_id))
    }

    /// Moves the talk from `step_slug` through `output_slug` to the next step.
    ///
    /// A `None` next step is the terminal transition: the talk is left without
    /// a current step and its flow is finished.
    ///
    /// # Errors
    ///
    /// - `CurrentStepMismatch` if `step_slug` is not the talk's current step
    /// - `StepNotFound` if `next_step_slug` is not part of the flow
    /// - `ValidationFailed` if `output_slug` is not an output of the step
    pub fn complete_step(
        &self,
        talk: &mut Talk,
        step_slug: &str,
        output_slug: Option<&str>,
        next_step_slug: Option<&str>,
    ) -> Result<(), DomainError> {
        let current = talk.flow_state().current_step_slug();
        if current != Some(step_slug) {
            return Err(DomainError::new(
                ErrorCode::CurrentStepMismatch,
                "Step is not the talk's current step",
            )
            .with_detail("talk_id", talk.id().to_string())
            .with_detail("step_slug", step_slug)
            .with_detail("current_step_slug", current.unwrap_or("")));
        }

        if let (Some(output_slug), Some(step)) =
            (output_slug, self.graph.find_step_by_slug(step_slug))
        {
            if step.output(output_slug).is_none() {
                return Err(DomainError::validation("output_slug", "Output not found on step")
                    .with_detail("step_slug", step_slug)
                    .with_detail("output_slug", output_slug));
            }
        }

        let next = match next_step_slug {
            Some(slug) => Some(self.require_step(slug)?.slug.clone()),
            None => None,
        };

        let state = talk.flow_state_mut();
        state.push_transition(StepTransition {
            step_slug: step_slug.to_string(),
            output_slug: output_slug.map(str::to_string),
            next_step_slug: next.clone(),
            at: Timestamp::now(),
        });
        state.set_current_step(next);
        Ok(())
    }

    /// True once the talk took a terminal transition and has no current step.
    pub fn is_flow_complete(&self, talk: &Talk) -> bool {
        let state = talk.flow_state();
        state.current_step_slug().is_none() && state.is_finished()
    }

    fn require_step(&self, slug: &str) -> Result<&'g Step, DomainError> {
        self.graph.find_step_by_slug(slug).ok_or_else(|| {
            DomainError::new(ErrorCode::StepNotFound, format!("Step not found: {}", slug))
                .with_detail("flow_id", self.graph.id().to_string())
        })
    }
}

fn all_questions_answered(talk: &Talk, step: &Step) -> bool {
    step.questions
        .iter()
        .all(|q| talk.flow_state().answer(&step.slug, &q.slug).is_some())
}
