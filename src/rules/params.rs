use serde::{Deserialize, Serialize};

use super::trigger::When;

/// Switches for one firing pass, so the same pipeline serves real play and
/// dry runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FireTriggerParams {
    /// The step being run. `None` fires phase-less triggers.
    pub step: Option<When>,
    pub use_uses: bool,
    pub test_uses: bool,
    pub test_chance: bool,
    pub test_when: bool,
    pub test_conditions: bool,
}

impl FireTriggerParams {
    /// Everything on: what a turn step runs.
    pub fn all(step: Option<When>) -> Self {
        Self {
            step,
            use_uses: true,
            test_uses: true,
            test_chance: true,
            test_when: true,
            test_conditions: true,
        }
    }

    /// Everything off: evaluate effects as if every gate had passed.
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn without_chance(&self) -> Self {
        Self {
            test_chance: false,
            ..self.clone()
        }
    }
}
