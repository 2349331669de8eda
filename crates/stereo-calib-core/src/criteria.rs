use serde::{Deserialize, Serialize};

/// Iteration/epsilon stopping rule shared by corner refinement and the solvers.
///
/// Iteration stops after `max_iterations` or once the update falls below
/// `epsilon`, whichever comes first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermCriteria {
    pub max_iterations: usize,
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            epsilon: 1e-3,
        }
    }
}

impl TermCriteria {
    pub fn new(max_iterations: usize, epsilon: f64) -> Self {
        Self {
            max_iterations,
            epsilon,
        }
    }
}
