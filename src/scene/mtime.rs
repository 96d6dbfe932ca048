use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// A modification timestamp.
///
/// Every call to [`MTime::tick`] returns a value greater than all previous
/// ticks in the process, so comparing two timestamps tells which change
/// happened later regardless of which object recorded it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MTime(u64);

impl MTime {
    pub const ZERO: MTime = MTime(0);

    pub fn tick() -> MTime {
        MTime(CLOCK.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Component holding the last time an entity was modified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Modified(pub MTime);

impl Modified {
    pub fn now() -> Self {
        Modified(MTime::tick())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_increase() {
        let a = MTime::tick();
        let b = MTime::tick();
        assert!(b > a);
        assert!(a > MTime::ZERO);
    }
}
