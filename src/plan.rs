//! The set of projected tasks handed over to the host executor.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use tracing::{Level, info};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::{BuildError, ProjectionError};
use crate::projection::TaskNode;
use crate::utils::{as_overhead, get_style_main, get_style_task};

/// A vertex of the plan graph.
#[derive(Debug, Clone, Copy)]
pub enum Vertex<'a> {
    Task(&'a TaskNode),
    /// A file some task depends on.
    File(&'a Utf8Path),
}

#[derive(Debug, Default, Clone)]
pub struct Plan {
    nodes: Vec<TaskNode>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: TaskNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rejects plans in which two tasks write the same file.
    pub fn validate(&self) -> Result<(), ProjectionError> {
        let mut seen = HashSet::new();

        for node in &self.nodes {
            if !seen.insert(node.target.as_path()) {
                return Err(ProjectionError::DuplicateTarget(node.target.clone()));
            }
        }

        Ok(())
    }

    /// The plan as a graph, with an edge from every file dependency to the
    /// task depending on it.
    pub fn graph(&self) -> Graph<Vertex<'_>, ()> {
        let mut graph = Graph::new();
        let mut files: HashMap<&Utf8Path, NodeIndex> = HashMap::new();

        for node in &self.nodes {
            let task = graph.add_node(Vertex::Task(node));

            for dep in &node.file_deps {
                let file = *files
                    .entry(dep.as_path())
                    .or_insert_with(|| graph.add_node(Vertex::File(dep)));
                graph.add_edge(file, task, ());
            }
        }

        graph
    }

    /// Runs every task once, in parallel, with no staleness checks.
    pub fn run_all(&self) -> Result<Diagnostics, BuildError> {
        self.validate()?;

        let start = Instant::now();

        let root_span = tracing::span!(Level::INFO, "writing_json");
        root_span.pb_set_length(self.nodes.len() as u64);
        root_span.pb_set_style(&get_style_main()?);
        root_span.pb_set_message("Writing JSON...");
        let _enter = root_span.enter();

        let pb_style = get_style_task()?;

        let execution_times = self
            .nodes
            .par_iter()
            .map(|node| -> Result<_, BuildError> {
                let span = tracing::span!(parent: &root_span, Level::INFO, "task", name = %node.name);
                span.pb_set_style(&pb_style);
                span.pb_set_message(&format!("Writing {}", node.target));
                let _enter = span.enter();

                let start = Instant::now();
                node.run()
                    .map_err(|e| BuildError::Task(node.name.clone(), e))?;
                let duration = start.elapsed();

                root_span.pb_inc(1);

                Ok((node.target.clone(), TaskExecution { start, duration }))
            })
            .collect::<Result<HashMap<_, _>, BuildError>>()?;

        info!("Wrote {} JSON documents {}", self.nodes.len(), as_overhead(start));

        Ok(Diagnostics { execution_times })
    }
}

impl Extend<TaskNode> for Plan {
    fn extend<I: IntoIterator<Item = TaskNode>>(&mut self, iter: I) {
        self.nodes.extend(iter);
    }
}

impl IntoIterator for Plan {
    type Item = TaskNode;
    type IntoIter = std::vec::IntoIter<TaskNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Renders the plan as a Mermaid diagram.
impl Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph();

        writeln!(f, "graph LR")?;

        for index in graph.node_indices() {
            match graph[index] {
                Vertex::Task(node) => {
                    let name = node.name.replace('"', "\\\"");
                    writeln!(f, "    {:?}[\"{}\"]", index.index(), name)?;
                }
                Vertex::File(path) => {
                    let path = path.as_str().replace('"', "\\\"");
                    writeln!(f, "    {:?}[(\"{}\")]", index.index(), path)?;
                }
            }
        }

        for edge in graph.raw_edges() {
            writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Timings of a [`Plan::run_all`] invocation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Execution metrics by task target.
    pub execution_times: HashMap<Utf8PathBuf, TaskExecution>,
}

impl Diagnostics {
    /// Sum of the time spent in every task.
    pub fn total(&self) -> Duration {
        self.execution_times.values().map(|t| t.duration).sum()
    }

    /// The `n` slowest tasks, slowest first.
    pub fn slowest(&self, n: usize) -> Vec<(&Utf8Path, Duration)> {
        let mut times: Vec<_> = self
            .execution_times
            .iter()
            .map(|(target, t)| (target.as_path(), t.duration))
            .collect();

        times.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        times.truncate(n);
        times
    }
}
