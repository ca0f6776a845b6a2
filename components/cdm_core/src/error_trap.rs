//! The `ongoingOcdmOperation` / `ocdmError` error trap (§4.2, §9).
//!
//! The native DRM library sometimes reports a failure via the `error`
//! callback instead of (or in addition to) a bad return code. `ErrorTrap`
//! lets a `KeySession` detect that: arm it before a DRM-forwarding call,
//! disarm and read it after.

use parking_lot::Mutex;

struct State {
    ongoing: bool,
    error: bool,
}

/// Mutex-guarded pair of booleans, one per `KeySession`.
pub struct ErrorTrap {
    state: Mutex<State>,
}

impl Default for ErrorTrap {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorTrap {
    /// Creates a disarmed trap.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                ongoing: false,
                error: false,
            }),
        }
    }

    /// Arms the trap before a DRM-forwarding call: `ongoing=true, error=false`.
    pub fn arm(&self) {
        let mut state = self.state.lock();
        state.ongoing = true;
        state.error = false;
    }

    /// Records that an error callback fired.
    pub fn record_error(&self) {
        self.state.lock().error = true;
    }

    /// Disarms the trap and reports whether an error callback fired while
    /// it was armed.
    pub fn disarm_and_check(&self) -> bool {
        let mut state = self.state.lock();
        state.ongoing = false;
        std::mem::take(&mut state.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_during_armed_window_is_reported_once() {
        let trap = ErrorTrap::new();
        trap.arm();
        trap.record_error();
        assert!(trap.disarm_and_check());
        // Reading again without rearming reports no error.
        assert!(!trap.disarm_and_check());
    }

    #[test]
    fn no_error_reports_clean() {
        let trap = ErrorTrap::new();
        trap.arm();
        assert!(!trap.disarm_and_check());
    }
}
