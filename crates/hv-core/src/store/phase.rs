//! Explicit loader state replacing independent loading/initialised flags

use thiserror::Error;

/// Where the record loader is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPhase {
    /// Waiting for the seed snapshot; viewport loads are disabled
    Seeding,
    /// A viewport session is waiting on its first page
    Loading,
    /// Seeded and not waiting on any first page
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid load phase transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: LoadPhase,
    pub to: LoadPhase,
}

impl LoadPhase {
    /// Validate a transition.
    ///
    /// Any phase may return to `Seeding` (reset). `Seeding` only leaves
    /// through `Idle`, once the seed settles. Overlapping sessions may
    /// re-enter `Loading`, and a session may settle an already idle loader.
    pub fn transition(self, to: LoadPhase) -> Result<LoadPhase, TransitionError> {
        use LoadPhase::*;
        match (self, to) {
            (_, Seeding) => Ok(to),
            (Seeding, Idle) => Ok(to),
            (Idle | Loading, Loading) => Ok(to),
            (Loading | Idle, Idle) => Ok(to),
            (Seeding, Loading) => Err(TransitionError { from: self, to }),
        }
    }

    pub fn is_loading(&self) -> bool {
        !matches!(self, LoadPhase::Idle)
    }

    pub fn initial_load_complete(&self) -> bool {
        !matches!(self, LoadPhase::Seeding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_loads_are_gated_on_seed() {
        assert!(LoadPhase::Seeding.transition(LoadPhase::Loading).is_err());
        assert_eq!(
            LoadPhase::Seeding.transition(LoadPhase::Idle),
            Ok(LoadPhase::Idle)
        );
        assert_eq!(
            LoadPhase::Loading.transition(LoadPhase::Seeding),
            Ok(LoadPhase::Seeding)
        );
    }
}
