//! Closed set of simulated-customer personas.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the simulated customer behaves.
///
/// Unknown persona names are rejected when scenarios are loaded; there is
/// no silent fallback to a default persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Polite,
    Frustrated,
    Confused,
    Detailed,
    Curt,
}

impl Persona {
    /// Every persona, in declaration order.
    pub const ALL: [Persona; 5] = [
        Persona::Polite,
        Persona::Frustrated,
        Persona::Confused,
        Persona::Detailed,
        Persona::Curt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Polite => "polite",
            Persona::Frustrated => "frustrated",
            Persona::Confused => "confused",
            Persona::Detailed => "detailed",
            Persona::Curt => "curt",
        }
    }

    /// Comma separated list of valid names, for error messages.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a persona name outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid persona '{0}', must be one of: {valid}", valid = Persona::valid_names())]
pub struct UnknownPersona(pub String);

impl FromStr for Persona {
    type Err = UnknownPersona;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPersona(s.to_string()))
    }
}
