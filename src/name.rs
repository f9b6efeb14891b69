use std::fmt;

// Format is
// <system>:<event>
// <system>/<event>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TracepointName<'a> {
    pub system: &'a str,
    pub event: &'a str,
}

impl<'a> TracepointName<'a> {
    pub const fn new(system: &'a str, event: &'a str) -> Self {
        TracepointName { system, event }
    }

    /// Split `"system:event"` or `"system/event"` at the first separator.
    pub fn parse(name: &'a str) -> Option<Self> {
        let (system, event) = name.split_once([':', '/'])?;
        if system.is_empty() || event.is_empty() {
            return None;
        }
        Some(TracepointName { system, event })
    }

    /// True if both parts are usable as tracefs directory names.
    pub fn is_valid(&self) -> bool {
        is_valid_name_part(self.system) && is_valid_name_part(self.event)
    }
}

/// A system or event name must be non-empty and must not contain `/`, `.` or NUL.
pub fn is_valid_name_part(part: &str) -> bool {
    !part.is_empty() && !part.contains(['/', '.', '\0'])
}

impl fmt::Display for TracepointName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system, self.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let name = TracepointName::parse("sched:sched_switch").unwrap();
        assert_eq!(name.system, "sched");
        assert_eq!(name.event, "sched_switch");

        let name = TracepointName::parse("syscalls/sys_enter_openat").unwrap();
        assert_eq!(name, TracepointName::new("syscalls", "sys_enter_openat"));
        assert_eq!(name.to_string(), "syscalls:sys_enter_openat");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(TracepointName::parse("sched").is_none());
        assert!(TracepointName::parse(":sched_switch").is_none());
        assert!(TracepointName::parse("sched:").is_none());
    }

    #[test]
    fn test_is_valid() {
        assert!(TracepointName::new("sched", "sched_switch").is_valid());
        assert!(!TracepointName::new("a/b", "x").is_valid());
        assert!(!TracepointName::new("a", "c.d").is_valid());
        assert!(!TracepointName::new("a", "c\0d").is_valid());
        assert!(!TracepointName::new("", "x").is_valid());
    }
}
