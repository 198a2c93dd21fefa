// Per-request phase tracking

use std::fmt;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Classifying,
    Dispatching,
    Racing,
    SingleFetching,
    Validating,
    Delivering,
    Failing,
    Presenting,
    Expired,
    Done,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivering | Self::Failing | Self::Presenting | Self::Expired
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classifying => "classifying",
            Self::Dispatching => "dispatching",
            Self::Racing => "racing",
            Self::SingleFetching => "single_fetching",
            Self::Validating => "validating",
            Self::Delivering => "delivering",
            Self::Failing => "failing",
            Self::Presenting => "presenting",
            Self::Expired => "expired",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Ordered record of the phases one request went through.
///
/// A phase is entered at most once, and only one terminal phase is ever
/// entered. Violations are programming errors and trip a debug assertion.
#[derive(Debug, Clone, Default)]
pub struct Trail {
    phases: Vec<Phase>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, phase: Phase) {
        debug_assert!(
            !self.phases.contains(&phase),
            "phase {} entered twice",
            phase
        );
        debug_assert!(
            !(phase.is_terminal() && self.phases.iter().any(Phase::is_terminal)),
            "second terminal phase {}",
            phase
        );
        debug!(%phase, "router phase");
        self.phases.push(phase);
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn terminal(&self) -> Option<Phase> {
        self.phases.iter().copied().find(Phase::is_terminal)
    }
}
