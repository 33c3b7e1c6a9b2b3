use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    TargetUnhealthy(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::TargetUnhealthy(_) => ExitCode::TargetUnhealthy,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::TargetUnhealthy(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<swarmr_core::Error> for RunError {
    fn from(err: swarmr_core::Error) -> Self {
        use swarmr_core::Error;
        match err {
            Error::TargetUnhealthy(_) => Self::TargetUnhealthy(err.into()),
            Error::InvalidTarget(_)
            | Error::InvalidTimeout
            | Error::InvalidDelayRange { .. }
            | Error::InvalidProbability(_)
            | Error::EmptyPlan
            | Error::InvalidWeights
            | Error::UnsupportedAction(_)
            | Error::MissingIdPlaceholder(_)
            | Error::InvalidEndpointPath(_)
            | Error::InvalidSweep(_) => Self::InvalidInput(err.into()),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::TargetUnhealthy(e) | Self::RuntimeError(e) => {
                write!(f, "{e:#}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let unhealthy = RunError::from(swarmr_core::Error::TargetUnhealthy("503".to_string()));
        assert_eq!(unhealthy.exit_code(), ExitCode::TargetUnhealthy);

        let invalid = RunError::from(swarmr_core::Error::EmptyPlan);
        assert_eq!(invalid.exit_code(), ExitCode::InvalidInput);
        assert_eq!(invalid.to_string(), "action plan is empty");
    }
}
