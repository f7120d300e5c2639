use std::sync::atomic::{AtomicU8, Ordering};

const NONE: u8 = 0;

/// Why a blocking wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum InterruptKind {
    Pause = 1,
    Stop = 2,
}

/// Lock-free interrupt flag shared between the control and engine threads.
///
/// Raising is sticky and monotone: once `Stop` is raised it cannot be
/// downgraded to `Pause`, and only a pending `Pause` can be cleared.
#[derive(Debug, Default)]
pub struct Interrupt(AtomicU8);

impl Interrupt {
    pub fn new() -> Self {
        Self(AtomicU8::new(NONE))
    }

    pub fn raise(&self, kind: InterruptKind) {
        self.0.fetch_max(kind as u8, Ordering::AcqRel);
    }

    pub fn current(&self) -> Option<InterruptKind> {
        match self.0.load(Ordering::Acquire) {
            1 => Some(InterruptKind::Pause),
            2 => Some(InterruptKind::Stop),
            _ => None,
        }
    }

    pub fn is_raised(&self) -> bool {
        self.current().is_some()
    }

    /// Clears a pending pause. Returns false if nothing was cleared.
    pub fn clear_pause(&self) -> bool {
        self.0
            .compare_exchange(
                InterruptKind::Pause as u8,
                NONE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_dominates_pause() {
        let flag = Interrupt::new();
        assert_eq!(flag.current(), None);
        flag.raise(InterruptKind::Stop);
        flag.raise(InterruptKind::Pause);
        assert_eq!(flag.current(), Some(InterruptKind::Stop));
        assert!(!flag.clear_pause());
        assert_eq!(flag.current(), Some(InterruptKind::Stop));
    }

    #[test]
    fn test_pause_clears() {
        let flag = Interrupt::new();
        flag.raise(InterruptKind::Pause);
        assert!(flag.is_raised());
        assert!(flag.clear_pause());
        assert!(!flag.is_raised());
        assert!(!flag.clear_pause());
    }
}
