use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DriverError;

/// One lifecycle operation run against the terraform binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Init,
    Plan,
    Apply,
    Destroy,
    Output,
    Show,
    ForceUnlock,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Init,
        Action::Plan,
        Action::Apply,
        Action::Destroy,
        Action::Output,
        Action::Show,
        Action::ForceUnlock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Init => "init",
            Action::Plan => "plan",
            Action::Apply => "apply",
            Action::Destroy => "destroy",
            Action::Output => "output",
            Action::Show => "show",
            Action::ForceUnlock => "force-unlock",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DriverError::InvalidAction(s.to_string()))
    }
}

/// Expand the caller's action list into the steps actually executed.
///
/// A `plan` with a configured plan file implies a following `show`, so the
/// plan is materialised as JSON in the same logical unit. Order is otherwise
/// preserved exactly as given.
pub fn resolve_steps(actions: &[Action], has_plan_file: bool) -> Vec<Action> {
    let mut steps = Vec::with_capacity(actions.len() + 1);
    for &action in actions {
        steps.push(action);
        if action == Action::Plan && has_plan_file {
            steps.push(Action::Show);
        }
    }
    steps
}
