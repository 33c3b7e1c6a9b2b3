use crate::record::Action;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("target is unhealthy: {0}")]
    TargetUnhealthy(String),

    #[error("invalid target `{0}` (expected an http:// or https:// base address)")]
    InvalidTarget(String),

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("invalid delay range: min {min:?} is greater than max {max:?}")]
    InvalidDelayRange {
        min: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("follow-up probability must be within 0.0..=1.0, got {0}")]
    InvalidProbability(f64),

    #[error("action plan is empty")]
    EmptyPlan,

    #[error("weighted action mix needs at least one positive weight")]
    InvalidWeights,

    #[error("no request builder registered for action `{0}`")]
    UnsupportedAction(Action),

    #[error("item path `{0}` must contain an `{{id}}` placeholder")]
    MissingIdPlaceholder(String),

    #[error("invalid endpoint path `{0}` (must start with `/`)")]
    InvalidEndpointPath(String),

    #[error("`{0}` must be a positive integer")]
    InvalidSweep(&'static str),
}
