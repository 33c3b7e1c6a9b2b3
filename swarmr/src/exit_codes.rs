#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// The run finished, including runs interrupted with partial results.
    Success = 0,

    /// The pre-run health check did not get a 200 from the target.
    TargetUnhealthy = 20,

    /// Invalid CLI/config (bad flags, durations, mixes, endpoint paths, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (I/O errors, or workers that panicked mid-run).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
