//! Host error codes
//!
//! The host driver model reports attach results as `0` or a negative errno.
//! Host services that can fail for more than one reason (region binding,
//! child device creation) report the errno they would return to a caller.

use core::fmt;

/// Positive errno value as used by the host kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Errno(pub i32);

impl Errno {
    /// I/O error
    pub const EIO: Self = Self(5);
    /// Out of memory
    pub const ENOMEM: Self = Self(12);
    /// Device or resource busy
    pub const EBUSY: Self = Self(16);
    /// No such device
    pub const ENODEV: Self = Self(19);
    /// Invalid argument
    pub const EINVAL: Self = Self(22);
    /// Driver requests probe retry (kernel-internal)
    pub const EPROBE_DEFER: Self = Self(517);

    /// Value in the attach-result convention (negative errno).
    pub const fn to_status(self) -> i32 {
        self.0.wrapping_neg()
    }

    /// Symbolic name, if this is one of the codes the test reports.
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            5 => Some("EIO"),
            12 => Some("ENOMEM"),
            16 => Some("EBUSY"),
            19 => Some("ENODEV"),
            22 => Some("EINVAL"),
            517 => Some("EPROBE_DEFER"),
            _ => None,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "-{name}"),
            None => write!(f, "errno {}", self.0.wrapping_neg()),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for Errno {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_negative_errno() {
        assert_eq!(Errno::ENODEV.to_status(), -19);
        assert_eq!(Errno::EPROBE_DEFER.to_status(), -517);
    }

    #[test]
    fn display_uses_symbolic_names() {
        assert_eq!(std::format!("{}", Errno::ENOMEM), "-ENOMEM");
        assert_eq!(std::format!("{}", Errno(95)), "errno -95");
    }

    #[test]
    fn usable_as_std_error() {
        let err: std::boxed::Box<dyn std::error::Error> = std::boxed::Box::new(Errno::EBUSY);
        assert_eq!(err.to_string(), "-EBUSY");
        assert!(err.source().is_none());
    }
}
