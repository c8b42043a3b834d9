use thiserror::Error;

/// Failure of a leximin computation.
///
/// Input errors are raised before the optimizer is called. Optimization failures carry the
/// collaborator's error as their source. An internal-consistency failure means a round ended
/// without saturating anyone, which the saturation theorem rules out for a correct optimizer.
#[derive(Debug, Error)]
pub enum LeximinError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("optimizer failed in saturation round {round}")]
    Optimization {
        round: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "no agent became saturated in round {round} (free agents {free_agents:?}); \
         the optimizer or the constraint formulation is inconsistent"
    )]
    InternalConsistency { round: usize, free_agents: Vec<usize> },
}

impl LeximinError {
    pub fn input(message: impl Into<String>) -> Self {
        LeximinError::Input(message.into())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, LeximinError::Input(_))
    }

    pub fn is_optimization(&self) -> bool {
        matches!(self, LeximinError::Optimization { .. })
    }

    pub fn is_internal_consistency(&self) -> bool {
        matches!(self, LeximinError::InternalConsistency { .. })
    }
}

pub type Result<T, E = LeximinError> = std::result::Result<T, E>;

/// Returns early with [`LeximinError::Input`] unless the condition holds.
macro_rules! ensure_input {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::LeximinError::Input(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_input;
