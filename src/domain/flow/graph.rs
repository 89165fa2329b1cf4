//! FlowGraph - immutable arena of steps and the connections between them.
//!
//! Steps are stored once and addressed through id/slug indexes. Connections
//! are indexed by their source output so routing lookups stay O(1).
//!
//! # Invariants (enforced by `FlowGraph::new`)
//!
//! - Step ids and slugs are unique within the flow
//! - Question, input and output slugs are unique within their step
//! - Every connection references an existing output and input
//! - No connection links a step to itself
//! - An output has at most one outgoing connection
//!
//! Zero or several `first` steps are allowed: such a flow is degenerate
//! (nothing is reachable) and reported through `diagnostics()`.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::domain::foundation::{DomainError, ErrorCode, InputId, OutputId, StepId, TreeFlowId};

use super::step::{Connection, Input, Output, Step};

/// Authoring defect found in a flow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowDiagnostic {
    /// No step is marked `first`.
    MissingFirstStep,
    /// More than one step is marked `first`.
    MultipleFirstSteps { step_slugs: Vec<String> },
    /// Step cannot be reached from the first step.
    UnreachableStep { step_slug: String },
    /// Output has no connection; the flow ends when it fires.
    DeadEndOutput { step_slug: String, output_slug: String },
}

/// In-memory flow definition.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    id: TreeFlowId,
    name: String,
    steps: Vec<Step>,
    connections: Vec<Connection>,
    step_by_id: HashMap<StepId, usize>,
    step_by_slug: HashMap<String, usize>,
    input_owner: HashMap<InputId, usize>,
    output_owner: HashMap<OutputId, usize>,
    connection_by_output: HashMap<OutputId, usize>,
}

impl FlowGraph {
    /// Builds a graph, validating its structural invariants.
    pub fn new(
        id: TreeFlowId,
        name: impl Into<String>,
        steps: Vec<Step>,
        connections: Vec<Connection>,
    ) -> Result<Self, DomainError> {
        let mut step_by_id = HashMap::new();
        let mut step_by_slug = HashMap::new();
        let mut input_owner = HashMap::new();
        let mut output_owner = HashMap::new();

        for (idx, step) in steps.iter().enumerate() {
            if step.slug.trim().is_empty() {
                return Err(DomainError::invalid_flow("Step slug cannot be empty")
                    .with_detail("step_id", step.id.to_string()));
            }
            if step_by_id.insert(step.id, idx).is_some() {
                return Err(DomainError::invalid_flow("Duplicate step id")
                    .with_detail("step_id", step.id.to_string()));
            }
            if step_by_slug.insert(step.slug.clone(), idx).is_some() {
                return Err(DomainError::invalid_flow("Duplicate step slug")
                    .with_detail("step_slug", step.slug.clone()));
            }

            ensure_unique_slugs(step, "question", step.questions.iter().map(|q| q.slug.as_str()))?;
            ensure_unique_slugs(step, "input", step.inputs.iter().map(|i| i.slug.as_str()))?;
            ensure_unique_slugs(step, "output", step.outputs.iter().map(|o| o.slug.as_str()))?;

            for input in &step.inputs {
                if input_owner.insert(input.id, idx).is_some() {
                    return Err(DomainError::invalid_flow("Duplicate input id")
                        .with_detail("input_id", input.id.to_string()));
                }
            }
            for output in &step.outputs {
                if output_owner.insert(output.id, idx).is_some() {
                    return Err(DomainError::invalid_flow("Duplicate output id")
                        .with_detail("output_id", output.id.to_string()));
                }
            }
        }

        let mut connection_by_output = HashMap::new();
        for (idx, connection) in connections.iter().enumerate() {
            let source = output_owner.get(&connection.source_output).ok_or_else(|| {
                DomainError::invalid_flow("Connection references unknown output")
                    .with_detail("output_id", connection.source_output.to_string())
            })?;
            let target = input_owner.get(&connection.target_input).ok_or_else(|| {
                DomainError::invalid_flow("Connection references unknown input")
                    .with_detail("input_id", connection.target_input.to_string())
            })?;
            if source == target {
                return Err(DomainError::invalid_flow("Connection cannot loop back to its own step")
                    .with_detail("step_slug", steps[*source].slug.clone()));
            }
            if let Some(existing) = connection_by_output.insert(connection.source_output, idx) {
                let message = if connections[existing] == *connection {
                    "Duplicate connection"
                } else {
                    "Output already has a connection"
                };
                return Err(DomainError::invalid_flow(message)
                    .with_detail("output_id", connection.source_output.to_string()));
            }
        }

        Ok(Self {
            id,
            name: name.into(),
            steps,
            connections,
            step_by_id,
            step_by_slug,
            input_owner,
            output_owner,
            connection_by_output,
        })
    }

    pub fn id(&self) -> TreeFlowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Finds a step by id.
    pub fn find_step(&self, id: &StepId) -> Result<&Step, DomainError> {
        self.step_by_id
            .get(id)
            .map(|idx| &self.steps[*idx])
            .ok_or_else(|| {
                DomainError::new(ErrorCode::StepNotFound, format!("Step not found: {}", id))
            })
    }

    /// Finds a step by slug. `None` when the flow no longer has it.
    pub fn find_step_by_slug(&self, slug: &str) -> Option<&Step> {
        self.step_by_slug.get(slug).map(|idx| &self.steps[*idx])
    }

    pub fn outputs_of<'a>(&self, step: &'a Step) -> &'a [Output] {
        &step.outputs
    }

    pub fn inputs_of<'a>(&self, step: &'a Step) -> &'a [Input] {
        &step.inputs
    }

    /// The connection leaving an output, if the output is wired.
    pub fn connection_from(&self, output_id: &OutputId) -> Option<&Connection> {
        self.connection_by_output
            .get(output_id)
            .map(|idx| &self.connections[*idx])
    }

    /// Step owning the input that the output is connected to.
    pub fn target_step_of(&self, output_id: &OutputId) -> Option<&Step> {
        let connection = self.connection_from(output_id)?;
        self.input_owner
            .get(&connection.target_input)
            .map(|idx| &self.steps[*idx])
    }

    /// Step owning an output.
    pub fn step_of_output(&self, output_id: &OutputId) -> Option<&Step> {
        self.output_owner.get(output_id).map(|idx| &self.steps[*idx])
    }

    /// The unique entry step. `None` for zero or several `first` steps.
    pub fn first_step(&self) -> Option<&Step> {
        let mut firsts = self.steps.iter().filter(|s| s.first);
        match (firsts.next(), firsts.next()) {
            (Some(step), None) => Some(step),
            _ => None,
        }
    }

    /// Steps reachable from the first step, following connections breadth-first.
    ///
    /// Empty when the flow has no unique first step.
    pub fn reachable_steps(&self) -> BTreeSet<StepId> {
        let mut reachable = BTreeSet::new();
        let Some(first) = self.first_step() else {
            return reachable;
        };

        let mut visited: HashSet<usize> = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(idx) = self.step_by_id.get(&first.id) {
            visited.insert(*idx);
            queue.push_back(*idx);
        }

        while let Some(idx) = queue.pop_front() {
            let step = &self.steps[idx];
            reachable.insert(step.id);

            for output in &step.outputs {
                let Some(connection) = self.connection_from(&output.id) else {
                    continue;
                };
                if let Some(target) = self.input_owner.get(&connection.target_input) {
                    if visited.insert(*target) {
                        queue.push_back(*target);
                    }
                }
            }
        }

        reachable
    }

    /// Steps that can never be reached, in declaration order.
    pub fn unreachable_steps(&self) -> Vec<&Step> {
        let reachable = self.reachable_steps();
        self.steps
            .iter()
            .filter(|s| !reachable.contains(&s.id))
            .collect()
    }

    /// Lists authoring defects. An empty list means the flow is well formed.
    pub fn diagnostics(&self) -> Vec<FlowDiagnostic> {
        let mut diagnostics = Vec::new();

        let firsts: Vec<String> = self
            .steps
            .iter()
            .filter(|s| s.first)
            .map(|s| s.slug.clone())
            .collect();
        match firsts.len() {
            0 => diagnostics.push(FlowDiagnostic::MissingFirstStep),
            1 => {}
            _ => diagnostics.push(FlowDiagnostic::MultipleFirstSteps { step_slugs: firsts }),
        }

        for step in self.unreachable_steps() {
            diagnostics.push(FlowDiagnostic::UnreachableStep {
                step_slug: step.slug.clone(),
            });
        }

        for step in &self.steps {
            for output in &step.outputs {
                if self.connection_from(&output.id).is_none() {
                    diagnostics.push(FlowDiagnostic::DeadEndOutput {
                        step_slug: step.slug.clone(),
                        output_slug: output.slug.clone(),
                    });
                }
            }
        }

        diagnostics
    }
}

fn ensure_unique_slugs<'a>(
    step: &Step,
    kind: &str,
    slugs: impl Iterator<Item = &'a str>,
) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for slug in slugs {
        if slug.trim().is_empty() {
            return Err(DomainError::invalid_flow(format!("{} slug cannot be empty", kind))
                .with_detail("step_slug", step.slug.clone()));
        }
        if !seen.insert(slug) {
            return Err(DomainError::invalid_flow(format!("Duplicate {} slug", kind))
                .with_detail("step_slug", step.slug.clone())
                .with_detail("slug", slug));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::step::{InputType, Question};
    use proptest::prelude::*;

    fn step(slug: &str) -> Step {
        Step::new(slug, slug.to_uppercase())
            .with_input(Input::new(format!("{}-in", slug), "In", InputType::Any))
            .with_output(Output::new(format!("{}-out", slug), "Out"))
    }

    fn connect(from: &Step, to: &Step) -> Connection {
        Connection::new(from.outputs[0].id, to.inputs[0].id)
    }

    fn graph(steps: Vec<Step>, connections: Vec<Connection>) -> FlowGraph {
        FlowGraph::new(TreeFlowId::new(), "Test flow", steps, connections).unwrap()
    }

    #[test]
    fn reachable_steps_follow_connections_from_first() {
        let a = step("a").as_first();
        let b = step("b");
        let c = step("c");
        let connections = vec![connect(&a, &b)];
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);

        let flow = graph(vec![a, b, c], connections);
        let reachable = flow.reachable_steps();

        assert!(reachable.contains(&a_id));
        assert!(reachable.contains(&b_id));
        assert!(!reachable.contains(&c_id));
        assert_eq!(flow.unreachable_steps()[0].slug, "c");
    }

    #[test]
    fn cycles_visit_each_step_once() {
        let a = step("a").as_first();
        let b = step("b");
        let connections = vec![connect(&a, &b), connect(&b, &a)];

        let flow = graph(vec![a, b], connections);
        assert_eq!(flow.reachable_steps().len(), 2);
    }

    #[test]
    fn flow_without_first_step_reaches_nothing() {
        let flow = graph(vec![step("a"), step("b")], vec![]);

        assert!(flow.first_step().is_none());
        assert!(flow.reachable_steps().is_empty());
        assert_eq!(flow.unreachable_steps().len(), 2);
        assert!(flow.diagnostics().contains(&FlowDiagnostic::MissingFirstStep));
    }

    #[test]
    fn flow_with_two_first_steps_is_degenerate() {
        let flow = graph(vec![step("a").as_first(), step("b").as_first()], vec![]);

        assert!(flow.reachable_steps().is_empty());
        assert!(matches!(
            flow.diagnostics()[0],
            FlowDiagnostic::MultipleFirstSteps { .. }
        ));
    }

    #[test]
    fn self_loop_is_rejected() {
        let a = step("a").as_first();
        let loop_back = connect(&a, &a);

        let result = FlowGraph::new(TreeFlowId::new(), "f", vec![a], vec![loop_back]);

        assert_eq!(result.unwrap_err().code, ErrorCode::InvalidFlow);
    }

    #[test]
    fn duplicate_connection_is_rejected() {
        let a = step("a").as_first();
        let b = step("b");
        let edge = connect(&a, &b);

        let result = FlowGraph::new(TreeFlowId::new(), "f", vec![a, b], vec![edge, edge]);

        let err = result.unwrap_err();
        assert_eq!(err.message, "Duplicate connection");
    }

    #[test]
    fn output_with_two_connections_is_rejected() {
        let a = step("a").as_first();
        let b = step("b");
        let c = step("c");
        let connections = vec![connect(&a, &b), connect(&a, &c)];

        let result = FlowGraph::new(TreeFlowId::new(), "f", vec![a, b, c], connections);

        assert_eq!(result.unwrap_err().message, "Output already has a connection");
    }

    #[test]
    fn connection_to_unknown_input_is_rejected() {
        let a = step("a").as_first();
        let dangling = Connection::new(a.outputs[0].id, InputId::new());

        let result = FlowGraph::new(TreeFlowId::new(), "f", vec![a], vec![dangling]);

        assert!(result.is_err());
    }

    #[test]
    fn duplicate_question_slug_is_rejected() {
        let a = step("a")
            .with_question(Question::new("email", "Email?"))
            .with_question(Question::new("email", "Email again?"));

        let result = FlowGraph::new(TreeFlowId::new(), "f", vec![a], vec![]);

        assert_eq!(result.unwrap_err().code, ErrorCode::InvalidFlow);
    }

    #[test]
    fn lookups_resolve_connections_and_targets() {
        let a = step("a").as_first();
        let b = step("b");
        let edge = connect(&a, &b);
        let output_id = a.outputs[0].id;
        let a_id = a.id;

        let flow = graph(vec![a, b], vec![edge]);

        assert_eq!(flow.connection_from(&output_id), Some(&edge));
        assert_eq!(flow.target_step_of(&output_id).unwrap().slug, "b");
        assert_eq!(flow.step_of_output(&output_id).unwrap().slug, "a");
        assert_eq!(flow.find_step(&a_id).unwrap().slug, "a");
        assert_eq!(
            flow.find_step(&StepId::new()).unwrap_err().code,
            ErrorCode::StepNotFound
        );
    }

    #[test]
    fn dead_end_outputs_are_reported() {
        let a = step("a").as_first();
        let flow = graph(vec![a], vec![]);

        assert_eq!(
            flow.diagnostics(),
            vec![FlowDiagnostic::DeadEndOutput {
                step_slug: "a".to_string(),
                output_slug: "a-out".to_string(),
            }]
        );
    }

    /// Builds a flow of `n` steps with edges `i -> j` taken from `edges`,
    /// each step exposing one output per potential target.
    fn random_flow(n: usize, edges: &[(usize, usize)], first: Option<usize>) -> FlowGraph {
        let mut steps: Vec<Step> = (0..n)
            .map(|i| {
                Step::new(format!("s{}", i), format!("Step {}", i))
                    .with_input(Input::new("in", "In", InputType::Any))
            })
            .collect();
        if let Some(f) = first {
            steps[f].first = true;
        }

        let mut connections = Vec::new();
        let mut seen = HashSet::new();
        for (from, to) in edges {
            let (from, to) = (from % n, to % n);
            if from == to || !seen.insert((from, to)) {
                continue;
            }
            let output = Output::new(format!("to-{}", to), "Out");
            connections.push(Connection::new(output.id, steps[to].inputs[0].id));
            steps[from].outputs.push(output);
        }

        FlowGraph::new(TreeFlowId::new(), "random", steps, connections).unwrap()
    }

    proptest! {
        #[test]
        fn reachable_set_is_deterministic_and_contains_first(
            n in 1usize..12,
            edges in proptest::collection::vec((0usize..12, 0usize..12), 0..30),
            first in 0usize..12,
        ) {
            let first = first % n;
            let flow = random_flow(n, &edges, Some(first));
            let first_id = flow.steps()[first].id;

            let once = flow.reachable_steps();
            let twice = flow.reachable_steps();

            prop_assert_eq!(&once, &twice);
            prop_assert!(once.contains(&first_id));
        }

        #[test]
        fn flows_without_unique_first_reach_nothing(
            n in 2usize..10,
            edges in proptest::collection::vec((0usize..10, 0usize..10), 0..20),
            second_first in 1usize..10,
            mark_two in any::<bool>(),
        ) {
            let mut flow_steps = random_flow(n, &edges, None).steps().to_vec();
            if mark_two {
                flow_steps[0].first = true;
                flow_steps[second_first % n].first = true;
                if second_first % n == 0 {
                    flow_steps[n - 1].first = true;
                }
            }
            let flow = FlowGraph::new(TreeFlowId::new(), "degenerate", flow_steps, vec![]).unwrap();

            prop_assert!(flow.reachable_steps().is_empty());
            prop_assert_eq!(flow.unreachable_steps().len(), n);
        }
    }
}
