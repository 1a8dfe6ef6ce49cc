//! Evaluator configuration.

use serde::{Deserialize, Serialize};

/// Options shared by a scope and the children it creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    /// `Gain` and `gain` name different parameters.
    pub case_sensitive_parameters: bool,
    /// `F(x)` and `f(x)` name different user functions.
    pub case_sensitive_functions: bool,
    /// Seed for `random()` and `gauss()`. Unseeded scopes draw from entropy.
    pub seed: Option<u64>,
}

impl EvaluatorSettings {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}
