//! Job-chain data model.
//!
//! A [`JobChain`] is the ordered list of steps declared for one run. Each
//! [`ChainElement`] is either one sequential command or a group of commands
//! that may run concurrently. The chain is built once from the declared flow
//! and is read-only during execution.

use serde::{Deserialize, Serialize};

/// One step of a job chain.
///
/// The variant set is closed on purpose: the executor matches exhaustively on
/// it, and there is no open-ended dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "commands", rename_all = "camelCase")]
pub enum ChainElement {
    /// A single command that must finish before the next element starts.
    Sequential(String),
    /// One or more independent commands that may overlap with each other.
    ///
    /// Never empty: a `Parallel` element is only created with its first
    /// command and only ever grows.
    Parallel(Vec<String>),
}

impl ChainElement {
    /// Number of commands in this element.
    pub fn command_count(&self) -> usize {
        match self {
            ChainElement::Sequential(_) => 1,
            ChainElement::Parallel(commands) => commands.len(),
        }
    }
}

/// The full ordered flow declared for one run.
///
/// Element order is semantically meaningful and preserved exactly as
/// declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobChain {
    elements: Vec<ChainElement>,
}

impl JobChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command that runs on its own, after everything before it.
    pub fn push_sequential(&mut self, command: impl Into<String>) {
        self.elements.push(ChainElement::Sequential(command.into()));
    }

    /// Append a command that may run concurrently with its neighbors.
    ///
    /// If the chain currently ends with a `Parallel` group the command joins
    /// that group; otherwise a new group is opened. A run of consecutive
    /// concurrent declarations therefore collapses into a single group
    /// bounded by its sequential neighbors.
    pub fn push_concurrent(&mut self, command: impl Into<String>) {
        match self.elements.last_mut() {
            Some(ChainElement::Parallel(commands)) => commands.push(command.into()),
            _ => self
                .elements
                .push(ChainElement::Parallel(vec![command.into()])),
        }
    }

    pub fn elements(&self) -> &[ChainElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Total number of commands across all elements.
    pub fn command_count(&self) -> usize {
        self.elements.iter().map(ChainElement::command_count).sum()
    }
}
