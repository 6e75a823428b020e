//! Process exit codes.

use tourgen_render::poller::PollOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Error,
    JobFailed,
    TimedOut,
    Cancelled,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::JobFailed => 3,
            Self::TimedOut => 4,
            Self::Cancelled => 130,
        }
    }

    pub fn from_outcome(outcome: &PollOutcome) -> Self {
        match outcome {
            PollOutcome::Succeeded { .. } => Self::Success,
            PollOutcome::Failed { .. } => Self::JobFailed,
            PollOutcome::TimedOut { .. } => Self::TimedOut,
            PollOutcome::Cancelled { .. } => Self::Cancelled,
        }
    }
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        std::process::ExitCode::from(exit.code())
    }
}
