use std::collections::HashMap;
use std::sync::Arc;

use tracing::{Instrument, debug, info_span};

use crate::{
    context::Context,
    error::{GraphError, Result},
    task::{NextAction, Task},
};

/// Upper bound on task executions in one run
pub const DEFAULT_STEP_LIMIT: usize = 32;

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Edge between tasks in the graph
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<EdgeCondition>,
}

/// An immutable graph of tasks. Built once at startup, executed once per request.
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
    step_limit: usize,
}

/// Outcome of a full graph run
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Response of the last task that produced one
    pub response: Option<String>,
    /// Status message of the last task that set one
    pub status_message: Option<String>,
    /// Task ids in execution order
    pub visited: Vec<String>,
}

impl Graph {
    /// Run the graph from its start task until a task ends the run or no edge applies
    pub async fn execute(&self, context: Context) -> Result<ExecutionResult> {
        let mut current = self
            .start_task_id
            .clone()
            .ok_or_else(|| GraphError::NoStartTask(self.id.clone()))?;
        let mut outcome = ExecutionResult::default();

        loop {
            if outcome.visited.len() >= self.step_limit {
                return Err(GraphError::StepLimitExceeded {
                    graph: self.id.clone(),
                    limit: self.step_limit,
                });
            }

            let task = self
                .tasks
                .get(&current)
                .cloned()
                .ok_or_else(|| GraphError::TaskNotFound(current.clone()))?;

            let span = info_span!("task", graph = %self.id, task = %current);
            let result = task.run(context.clone()).instrument(span).await?;
            outcome.visited.push(current.clone());

            if result.response.is_some() {
                outcome.response = result.response;
            }
            if result.status_message.is_some() {
                outcome.status_message = result.status_message;
            }

            match result.next_action {
                NextAction::End => break,
                NextAction::GoTo(target) => {
                    if !self.tasks.contains_key(&target) {
                        return Err(GraphError::TaskNotFound(target));
                    }
                    current = target;
                }
                NextAction::Continue => match self.find_next_task(&current, &context) {
                    Some(next) => current = next,
                    None => break,
                },
            }
        }

        debug!(graph = %self.id, steps = outcome.visited.len(), "graph run finished");
        Ok(outcome)
    }

    /// Find the next task based on edges and conditions.
    /// Edges are checked in insertion order; the first one that applies wins.
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        self.edges
            .iter()
            .filter(|edge| edge.from == current_task_id)
            .find(|edge| edge.condition.as_ref().is_none_or(|condition| condition(context)))
            .map(|edge| edge.to.clone())
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
    step_limit: usize,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            start_task_id: None,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Add a task. The first task added becomes the start task.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.start_task_id.is_none() {
            self.start_task_id = Some(task_id.clone());
        }
        self.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            condition: None,
        });
        self
    }

    /// Branch to `yes` when `condition` holds, otherwise to `no`
    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        let from = from.into();
        self.edges.push(Edge {
            from: from.clone(),
            to: yes.into(),
            condition: Some(Arc::new(condition)),
        });
        self.edges.push(Edge {
            from,
            to: no.into(),
            condition: None,
        });
        self
    }

    pub fn step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn build(self) -> Graph {
        Graph {
            id: self.id,
            tasks: self.tasks,
            edges: self.edges,
            start_task_id: self.start_task_id,
            step_limit: self.step_limit,
        }
    }
}
