//! Reconciliation reports.
//!
//! Every template run produces a tree of [`Objective`]s: one per organization,
//! one per template element, and nested ones for service containers and
//! connection points. Each node records what was found and the worst status
//! seen anywhere below it.

use std::fmt;

use serde::Serialize;

/// Outcome of one objective. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Ok,
    NeedsConfigure,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "ok",
            Status::NeedsConfigure => "needs configure",
            Status::Error => "error",
        })
    }
}

/// What a template run does with the differences it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Report differences only.
    Check,
    /// Create or update until the organization matches.
    Configure,
    /// Remove what the template names.
    Purge,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Check => "check",
            Mode::Configure => "apply",
            Mode::Purge => "purge",
        })
    }
}

/// One node of a reconciliation report.
#[derive(Debug, Clone, Serialize)]
pub struct Objective {
    target: String,
    status: Status,
    /// Differences found at this node (not counting children).
    drift: usize,
    messages: Vec<String>,
    children: Vec<Objective>,
}

impl Objective {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: Status::Ok,
            drift: 0,
            messages: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        let mut objective = Self::new(target);
        objective.fail(message);
        objective
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Worst status of this node and everything below it.
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn children(&self) -> &[Objective] {
        &self.children
    }

    /// Record an informational message.
    pub fn note(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record a difference that has not been fixed.
    pub fn needs(&mut self, message: impl Into<String>) {
        self.drift += 1;
        self.messages.push(message.into());
        self.raise(Status::NeedsConfigure);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
        self.raise(Status::Error);
    }

    pub fn push(&mut self, child: Objective) {
        self.raise(child.status);
        self.children.push(child);
    }

    /// Number of unfixed differences in this subtree.
    pub fn differences(&self) -> usize {
        self.drift + self.children.iter().map(Objective::differences).sum::<usize>()
    }

    /// Number of failed objectives in this subtree.
    pub fn errors(&self) -> usize {
        let own = usize::from(self.status == Status::Error && self.children_ok());
        own + self.children.iter().map(Objective::errors).sum::<usize>()
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    fn children_ok(&self) -> bool {
        self.children.iter().all(|child| child.status != Status::Error)
    }

    fn raise(&mut self, status: Status) {
        self.status = self.status.max(status);
    }
}
