//! Job lifecycle state and run outcome

use core::fmt;

/// Outcome of one invocation of a job's `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still alive; run me again later
    Yield,

    /// Done; remove and drop me
    Finish,
}

impl Step {
    /// Check if the job asked to be removed
    #[inline]
    pub const fn is_finish(&self) -> bool {
        matches!(self, Step::Finish)
    }
}

/// Lifecycle of a node slot in a pool's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Slot is unused (never allocated, or job dropped)
    Free = 0,

    /// Owned by the pool, waiting to be spliced into the list
    Pending = 1,

    /// Reachable from the head sentinel; may be run
    Linked = 2,

    /// Returned `Finish` (or failed); being unlinked. Never runs again.
    Retired = 3,
}

impl JobState {
    /// Check if a worker may pick this job up
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, JobState::Linked)
    }

    /// Check if the pool still owns a job in this slot
    #[inline]
    pub const fn is_live(&self) -> bool {
        !matches!(self, JobState::Free)
    }
}

impl From<u8> for JobState {
    fn from(v: u8) -> Self {
        match v {
            1 => JobState::Pending,
            2 => JobState::Linked,
            3 => JobState::Retired,
            _ => JobState::Free,
        }
    }
}

impl From<JobState> for u8 {
    fn from(state: JobState) -> u8 {
        state as u8
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Free => write!(f, "FREE"),
            JobState::Pending => write!(f, "PENDING"),
            JobState::Linked => write!(f, "LINKED"),
            JobState::Retired => write!(f, "RETIRED"),
        }
    }
}
