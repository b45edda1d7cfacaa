//! Supervisory state machine: operator-visible states, auto-clamp flag,
//! fast-convergence window, init-failure latch, stall cadence and the WPD
//! long-calibration window.

use crate::events::MonitorEvent;

/// Three consecutive failed reinitializations latch `InitError` until an
/// operator intervenes.
pub const MAX_INIT_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    #[default]
    Initializing,
    InitError,
    FastConvergence,
    Normal,
    InfusionError,
    Completed,
}

impl SystemState {
    pub fn display_name(&self) -> &'static str {
        match self {
            SystemState::Initializing => "Initializing",
            SystemState::InitError => "Init Error",
            SystemState::FastConvergence => "Fast Convergence",
            SystemState::Normal => "Normal",
            SystemState::InfusionError => "Infusion Error",
            SystemState::Completed => "Completed",
        }
    }

    /// Uppercase enum name, as reported in the cloud payload.
    pub fn upper_name(&self) -> &'static str {
        match self {
            SystemState::Initializing => "INITIALIZING",
            SystemState::InitError => "INIT_ERROR",
            SystemState::FastConvergence => "FAST_CONVERGENCE",
            SystemState::Normal => "NORMAL",
            SystemState::InfusionError => "INFUSION_ERROR",
            SystemState::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone)]
struct LongCalWindow {
    start_ms: u64,
    accum_drops: u32,
    low_drops_reported: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StateMachine {
    state: SystemState,
    auto_clamp: bool,
    fast_conv_start_ms: Option<u64>,
    init_failures: u32,
    last_stall_check_ms: u64,
    long_cal: Option<LongCalWindow>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SystemState::Initializing,
            auto_clamp: false,
            fast_conv_start_ms: None,
            init_failures: 0,
            last_stall_check_ms: 0,
            long_cal: None,
        }
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn auto_clamp(&self) -> bool {
        self.auto_clamp
    }

    pub fn clear_auto_clamp(&mut self) {
        self.auto_clamp = false;
    }

    /// Move to `new_state` if different, emitting `StateChanged` and
    /// applying the entry actions (auto-clamp on error/completion, stall
    /// cadence rebase on Normal).
    pub fn transition_to(
        &mut self,
        new_state: SystemState,
        now_ms: u64,
        events: &mut Vec<MonitorEvent>,
    ) {
        if self.state == new_state {
            return;
        }
        tracing::info!(
            from = self.state.display_name(),
            to = new_state.display_name(),
            "state transition"
        );
        self.state = new_state;
        events.push(MonitorEvent::StateChanged(new_state));

        match new_state {
            SystemState::InfusionError | SystemState::Completed => {
                self.auto_clamp = true;
            }
            SystemState::Normal => {
                self.last_stall_check_ms = now_ms;
            }
            _ => {}
        }
    }

    // ── fast convergence ────────────────────────────────────────────────

    pub fn begin_fast_convergence(&mut self, now_ms: u64) {
        self.fast_conv_start_ms = Some(now_ms);
    }

    pub fn fast_convergence_expired(&self, now_ms: u64, duration_ms: u64) -> bool {
        match self.fast_conv_start_ms {
            Some(start) => now_ms.saturating_sub(start) >= duration_ms,
            None => false,
        }
    }

    pub fn end_fast_convergence(&mut self) {
        self.fast_conv_start_ms = None;
    }

    // ── init failure latch ──────────────────────────────────────────────

    /// Record one failed reinitialization; returns the consecutive count.
    pub fn note_init_failure(&mut self) -> u32 {
        self.init_failures = self.init_failures.saturating_add(1);
        self.init_failures
    }

    pub fn clear_init_failures(&mut self) {
        self.init_failures = 0;
    }

    pub fn init_failures(&self) -> u32 {
        self.init_failures
    }

    /// Latched after three consecutive failed reinitializations; while
    /// latched the engine refuses further reinit attempts until the
    /// counter is cleared by an operator reset.
    pub fn init_locked(&self) -> bool {
        self.init_failures >= MAX_INIT_FAILURES
    }

    // ── stall cadence ───────────────────────────────────────────────────

    /// True once per `cadence_ms` while the caller polls every tick.
    pub fn stall_check_due(&mut self, now_ms: u64, cadence_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_stall_check_ms) >= cadence_ms {
            self.last_stall_check_ms = now_ms;
            true
        } else {
            false
        }
    }

    // ── WPD long-calibration window ─────────────────────────────────────

    pub fn start_long_cal(&mut self, now_ms: u64) {
        self.long_cal = Some(LongCalWindow {
            start_ms: now_ms,
            accum_drops: 0,
            low_drops_reported: false,
        });
    }

    pub fn stop_long_cal(&mut self) {
        self.long_cal = None;
    }

    pub fn long_cal_active(&self) -> bool {
        self.long_cal.is_some()
    }

    pub fn accumulate_long_cal_drops(&mut self, drops: u32) {
        if let Some(w) = &mut self.long_cal {
            w.accum_drops = w.accum_drops.saturating_add(drops);
        }
    }

    /// (elapsed_ms, accumulated drops) of the open window, if any.
    pub fn long_cal_progress(&self, now_ms: u64) -> Option<(u64, u32)> {
        self.long_cal
            .as_ref()
            .map(|w| (now_ms.saturating_sub(w.start_ms), w.accum_drops))
    }

    /// The low-drops condition is reported once per window.
    pub fn long_cal_take_low_drops_report(&mut self) -> bool {
        match &mut self.long_cal {
            Some(w) if !w.low_drops_reported => {
                w.low_drops_reported = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_emits_event_and_sets_clamp() {
        let mut sm = StateMachine::new();
        let mut events = Vec::new();
        sm.transition_to(SystemState::Normal, 1000, &mut events);
        sm.transition_to(SystemState::InfusionError, 2000, &mut events);
        assert_eq!(
            events,
            vec![
                MonitorEvent::StateChanged(SystemState::Normal),
                MonitorEvent::StateChanged(SystemState::InfusionError),
            ]
        );
        assert!(sm.auto_clamp());
    }

    #[test]
    fn self_transition_is_silent() {
        let mut sm = StateMachine::new();
        let mut events = Vec::new();
        sm.transition_to(SystemState::Initializing, 100, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn init_failures_latch_at_three() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.note_init_failure(), 1);
        assert!(!sm.init_locked());
        sm.note_init_failure();
        assert_eq!(sm.note_init_failure(), 3);
        assert!(sm.init_locked());
        sm.clear_init_failures();
        assert!(!sm.init_locked());
    }

    #[test]
    fn stall_cadence_fires_once_per_interval() {
        let mut sm = StateMachine::new();
        let mut events = Vec::new();
        sm.transition_to(SystemState::Normal, 0, &mut events);
        assert!(!sm.stall_check_due(5_000, 10_000));
        assert!(sm.stall_check_due(10_000, 10_000));
        assert!(!sm.stall_check_due(15_000, 10_000));
        assert!(sm.stall_check_due(20_000, 10_000));
    }

    #[test]
    fn fast_convergence_window() {
        let mut sm = StateMachine::new();
        sm.begin_fast_convergence(1_000);
        assert!(!sm.fast_convergence_expired(30_000, 60_000));
        assert!(sm.fast_convergence_expired(61_000, 60_000));
        sm.end_fast_convergence();
        assert!(!sm.fast_convergence_expired(120_000, 60_000));
    }

    #[test]
    fn long_cal_low_drops_reports_once() {
        let mut sm = StateMachine::new();
        sm.start_long_cal(0);
        sm.accumulate_long_cal_drops(5);
        assert_eq!(sm.long_cal_progress(70_000), Some((70_000, 5)));
        assert!(sm.long_cal_take_low_drops_report());
        assert!(!sm.long_cal_take_low_drops_report());
        sm.stop_long_cal();
        assert!(!sm.long_cal_active());
    }
}
