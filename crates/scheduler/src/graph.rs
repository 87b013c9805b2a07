//! Graph construction and Kahn ordering

use std::collections::VecDeque;

use piilop_core::{Error, Priority, Result};
use tracing::debug;

/// Anything the scheduler can order
pub trait Schedulable {
    /// Unique entry name
    fn name(&self) -> &str;
    /// Suite the entry belongs to
    fn suite(&self) -> &str;
    /// Scheduling hint
    fn priority(&self) -> Priority;
    /// Dependency tokens: suite names or name prefixes
    fn depends_on(&self) -> &[String];
}

/// Adjacency of one entry during a single sort.
///
/// Lists may hold the same neighbour more than once (two tokens matching the
/// same entry, or a token plus the `Last` rule); each copy is one edge.
#[derive(Debug, Default)]
struct Node {
    depends_on: Vec<usize>,
    dependents: Vec<usize>,
}

struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    fn new(len: usize) -> Self {
        Graph {
            nodes: (0..len).map(|_| Node::default()).collect(),
        }
    }

    /// Record "`a` depends on `b`", inverted when `b` is anchored last.
    fn link(&mut self, a: usize, b: usize, b_priority: Priority) {
        let (waiter, first) = if b_priority.is_last() { (b, a) } else { (a, b) };
        self.nodes[waiter].depends_on.push(first);
        self.nodes[first].dependents.push(waiter);
    }

    fn build<T: Schedulable>(entries: &[T]) -> Result<Self> {
        let mut graph = Graph::new(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            for token in entry.depends_on() {
                let mut found = false;
                for (other, candidate) in entries.iter().enumerate() {
                    if other == index {
                        continue;
                    }
                    if candidate.suite() == token || candidate.name().starts_with(token.as_str()) {
                        found = true;
                        graph.link(index, other, candidate.priority());
                    }
                }
                if !found {
                    return Err(Error::DependencyNotFound {
                        test: entry.name().to_string(),
                        dependency: token.clone(),
                    });
                }
            }
            if entry.priority().is_last() {
                for (other, candidate) in entries.iter().enumerate() {
                    if !candidate.priority().is_last() {
                        graph.link(index, other, candidate.priority());
                    }
                }
            }
        }
        Ok(graph)
    }

    /// Kahn's algorithm with a FIFO ready queue.
    fn order(&mut self) -> Vec<usize> {
        let mut ready: VecDeque<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.depends_on.is_empty())
            .map(|(index, _)| index)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(done) = ready.pop_front() {
            sorted.push(done);
            let dependents = std::mem::take(&mut self.nodes[done].dependents);
            for waiting in dependents {
                let node = &mut self.nodes[waiting];
                if let Some(pos) = node.depends_on.iter().position(|&d| d == done) {
                    node.depends_on.remove(pos);
                    if node.depends_on.is_empty() {
                        ready.push_back(waiting);
                    }
                }
            }
        }
        sorted
    }

    fn first_blocked(&self) -> Option<(usize, usize)> {
        self.nodes
            .iter()
            .enumerate()
            .find_map(|(index, node)| node.depends_on.first().map(|&dep| (index, dep)))
    }
}

/// Order `entries` and return their indices, first to run first.
pub fn sort_indices<T: Schedulable>(entries: &[T]) -> Result<Vec<usize>> {
    let mut graph = Graph::build(entries)?;
    let sorted = graph.order();

    if let Some((blocked, waits_on)) = graph.first_blocked() {
        return Err(Error::DependencyCycle {
            test: entries[blocked].name().to_string(),
            waits_on: entries[waits_on].name().to_string(),
        });
    }
    if sorted.len() != entries.len() {
        return Err(Error::SortLengthMismatch {
            sorted: sorted.len(),
            expected: entries.len(),
        });
    }

    debug!(count = sorted.len(), "sorted test plan");
    Ok(sorted)
}

/// Order `entries`, first to run first.
pub fn sort<T: Schedulable>(entries: &[T]) -> Result<Vec<&T>> {
    let order = sort_indices(entries)?;
    Ok(order.into_iter().map(|index| &entries[index]).collect())
}
