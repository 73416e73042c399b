use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FromIterator;
use std::ops::{BitOr, BitOrAssign};

/// Accumulated result of the tool invocations inside one scan action.
///
/// This is the typed form of the `((EXITCODE |= $?))` convention used in
/// every build spec: combining is a bitwise OR of exit codes, so once any
/// invocation reports a nonzero status the accumulator can never return to
/// clean. No distinction is made between a crashed tool and a tool that
/// reported findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Clean,
    Flagged {
        code: i32,
    },
}

impl Outcome {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            Outcome::Clean
        } else {
            Outcome::Flagged { code }
        }
    }

    /// Monoid combine. `Clean` is the identity element.
    pub fn combine(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::Clean, x) | (x, Outcome::Clean) => x,
            (Outcome::Flagged { code: a }, Outcome::Flagged { code: b }) => {
                Outcome::Flagged { code: a | b }
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Clean => 0,
            Outcome::Flagged { code } => *code,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Outcome::Clean)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Clean => "clean",
            Outcome::Flagged { .. } => "flagged",
        }
    }
}

impl BitOr for Outcome {
    type Output = Outcome;

    fn bitor(self, rhs: Outcome) -> Outcome {
        self.combine(rhs)
    }
}

impl BitOrAssign for Outcome {
    fn bitor_assign(&mut self, rhs: Outcome) {
        *self = self.combine(rhs);
    }
}

impl FromIterator<Outcome> for Outcome {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        iter.into_iter().fold(Outcome::Clean, Outcome::combine)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Clean => write!(f, "clean"),
            Outcome::Flagged { code } => write!(f, "flagged (exit {})", code),
        }
    }
}
