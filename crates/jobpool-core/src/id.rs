//! Job identifier type

use core::fmt;

/// Handle of a job node inside a pool's arena
///
/// This is a 32-bit index into the arena. It does not own the node; the
/// pool does. The maximum value (u32::MAX) is reserved as a sentinel for
/// "no job", used for the open ends of the job list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct JobId(u32);

impl JobId {
    /// Sentinel value indicating no job
    pub const NONE: JobId = JobId(u32::MAX);

    /// Create a new JobId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        JobId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Check if this refers to a node
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u32::MAX
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<JobId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl Default for JobId {
    fn default() -> Self {
        JobId::NONE
    }
}

impl From<u32> for JobId {
    #[inline]
    fn from(id: u32) -> Self {
        JobId(id)
    }
}

impl From<JobId> for u32 {
    #[inline]
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "JobId(NONE)")
        } else {
            write!(f, "JobId({})", self.0)
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "job#-")
        } else {
            write!(f, "job#{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sentinel() {
        assert!(JobId::NONE.is_none());
        assert!(!JobId::NONE.is_some());
        assert_eq!(JobId::NONE.to_option(), None);
        assert_eq!(JobId::default(), JobId::NONE);
    }

    #[test]
    fn test_conversions() {
        let id = JobId::new(17);
        assert_eq!(id.as_u32(), 17);
        assert_eq!(id.as_usize(), 17);
        assert_eq!(u32::from(id), 17);
        assert_eq!(JobId::from(17u32), id);
        assert_eq!(id.to_option(), Some(id));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format!("{}", JobId::new(3)), "job#3");
        assert_eq!(format!("{:?}", JobId::new(3)), "JobId(3)");
        assert_eq!(format!("{:?}", JobId::NONE), "JobId(NONE)");
    }
}
