//! Link status as seen by the fetcher

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the network link is currently usable.
///
/// The device's connectivity manager owns the real answer; the fetcher only
/// asks before enqueueing a job and before each worker step.
pub trait LinkStatus: Send + Sync {
    fn is_up(&self) -> bool;
}

/// Link state flipped by whoever manages connectivity.
#[derive(Debug)]
pub struct LinkFlag(AtomicBool);

impl LinkFlag {
    pub fn new(up: bool) -> Self {
        Self(AtomicBool::new(up))
    }

    pub fn set_up(&self, up: bool) {
        let was = self.0.swap(up, Ordering::AcqRel);
        if was != up {
            tracing::info!(up, "Link state changed");
        }
    }
}

impl Default for LinkFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LinkStatus for LinkFlag {
    fn is_up(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_toggles() {
        let link = LinkFlag::default();
        assert!(link.is_up());
        link.set_up(false);
        assert!(!link.is_up());
    }
}
