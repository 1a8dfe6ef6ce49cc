//! Dependency registry: which expressions read which parameters.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;
use log::trace;

/// Something whose value is derived from parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependent {
    Parameter(String),
    /// A named expression registered with `set_named_expression` or
    /// `add_action`.
    Expression(String),
}

/// Edges from a parameter to the expressions that read it.
///
/// Keys are already normalised by the owning scope.
#[derive(Debug, Clone, Default)]
pub struct DependencyRegistry {
    dependents: HashMap<String, IndexSet<Dependent>>,
    dependencies: HashMap<Dependent, IndexSet<String>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of parameters `dependent` reads.
    pub fn set(&mut self, dependent: Dependent, reads: IndexSet<String>) {
        self.remove(&dependent);
        for parameter in &reads {
            self.dependents
                .entry(parameter.clone())
                .or_default()
                .insert(dependent.clone());
        }
        if !reads.is_empty() {
            self.dependencies.insert(dependent, reads);
        }
    }

    /// Forget every edge out of `dependent`.
    pub fn remove(&mut self, dependent: &Dependent) {
        let Some(reads) = self.dependencies.remove(dependent) else {
            return;
        };
        for parameter in reads {
            if let Some(set) = self.dependents.get_mut(&parameter) {
                set.shift_remove(dependent);
                if set.is_empty() {
                    self.dependents.remove(&parameter);
                }
            }
        }
    }

    /// Direct readers of `parameter`.
    pub fn dependents(&self, parameter: &str) -> impl Iterator<Item = &Dependent> {
        self.dependents.get(parameter).into_iter().flatten()
    }

    /// Parameters read by `dependent`.
    pub fn dependencies(&self, dependent: &Dependent) -> impl Iterator<Item = &String> {
        self.dependencies.get(dependent).into_iter().flatten()
    }

    /// Everything that must be refreshed when `parameter` changes, in
    /// breadth-first order. Each dependent appears once even when the
    /// edges form a cycle.
    pub fn affected(&self, parameter: &str) -> Vec<Dependent> {
        let mut order = Vec::new();
        let mut seen: HashSet<Dependent> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([parameter]);
        seen.insert(Dependent::Parameter(parameter.to_string()));

        while let Some(name) = queue.pop_front() {
            for dependent in self.dependents(name) {
                if !seen.insert(dependent.clone()) {
                    continue;
                }
                trace!("invalidate {dependent:?} (reads {name})");
                order.push(dependent.clone());
                if let Dependent::Parameter(next) = dependent {
                    queue.push_back(next);
                }
            }
        }
        order
    }
}
