/* Per-axis movement classifier: idle / strafe / counter-strafe recognition,
 * predictive pre-arming, and jiggle-peek detection. One instance drives the
 * horizontal (A/D) axis; a second, optional instance drives vertical (W/S). */
use std::time::{Duration, Instant};

/// Depth below which a key is considered released.
pub const DEAD_ZONE: f32 = 0.01;

/// Jiggle-peek window: `>= JIGGLE_MIN_COUNT` ring entries within this many
/// milliseconds of `now` flips `is_jiggle` on.
const JIGGLE_WINDOW_MS: u64 = 300;
const JIGGLE_MIN_COUNT: usize = 2;
const JIGGLE_RING_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    Idle,
    StrafePos,
    StrafeNeg,
    CounterPos,
    CounterNeg,
}

/// Tunables the policy layer also reads; kept here since the state machine
/// is the only thing that evaluates them against live samples.
#[derive(Debug, Clone, Copy)]
pub struct AxisConfig {
    pub predict_threshold: f32,
    pub predict_min_peak: f32,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            predict_threshold: 0.70,
            predict_min_peak: 0.30,
        }
    }
}

/// One movement axis (positive/negative keys, e.g. D/A or W/S).
#[derive(Debug, Clone)]
pub struct Axis {
    pub state: AxisState,
    pub prev_state: AxisState,
    pub pos_peak: f32,
    pub neg_peak: f32,
    pub predictive: bool,

    counter_start: Option<Instant>,
    pub counter_elapsed_ms: u64,
    pub counter_count: u64,
    pub counter_total_ms: u64,

    jiggle_times: [Option<Instant>; JIGGLE_RING_SIZE],
    jiggle_cursor: usize,
    pub is_jiggle: bool,
    jiggle_last: Option<Instant>,

    config: AxisConfig,
}

impl Axis {
    pub fn new(config: AxisConfig) -> Self {
        Self {
            state: AxisState::Idle,
            prev_state: AxisState::Idle,
            pos_peak: 0.0,
            neg_peak: 0.0,
            predictive: false,
            counter_start: None,
            counter_elapsed_ms: 0,
            counter_count: 0,
            counter_total_ms: 0,
            jiggle_times: [None; JIGGLE_RING_SIZE],
            jiggle_cursor: 0,
            is_jiggle: false,
            jiggle_last: None,
            config,
        }
    }

    /// Advance the state machine one tick with the current and previous
    /// analog depths for both directions of this axis.
    pub fn update(&mut self, pos: f32, neg: f32, prev_pos: f32, prev_neg: f32, now: Instant) {
        self.prev_state = self.state;
        self.predictive = false;

        let pos_active = pos > DEAD_ZONE;
        let neg_active = neg > DEAD_ZONE;
        let pos_rising = pos_active && prev_pos <= DEAD_ZONE;
        let neg_rising = neg_active && prev_neg <= DEAD_ZONE;

        if !pos_active && !neg_active {
            if self.is_counter() {
                self.leave_counter(now);
            }
            self.state = AxisState::Idle;
            self.pos_peak = 0.0;
            self.neg_peak = 0.0;
        } else {
            match self.state {
                AxisState::Idle => {
                    if pos_rising && !neg_active {
                        self.state = AxisState::StrafePos;
                        self.pos_peak = pos;
                        self.neg_peak = 0.0;
                    } else if neg_rising && !pos_active {
                        self.state = AxisState::StrafeNeg;
                        self.neg_peak = neg;
                        self.pos_peak = 0.0;
                    }
                }
                AxisState::StrafePos => {
                    self.pos_peak = self.pos_peak.max(pos);
                    if neg_rising {
                        self.enter_counter(AxisState::CounterNeg, now);
                    } else if pos < self.pos_peak * self.config.predict_threshold
                        && self.pos_peak > self.config.predict_min_peak
                    {
                        self.predictive = true;
                    }
                }
                AxisState::StrafeNeg => {
                    self.neg_peak = self.neg_peak.max(neg);
                    if pos_rising {
                        self.enter_counter(AxisState::CounterPos, now);
                    } else if neg < self.neg_peak * self.config.predict_threshold
                        && self.neg_peak > self.config.predict_min_peak
                    {
                        self.predictive = true;
                    }
                }
                AxisState::CounterPos | AxisState::CounterNeg => {
                    let pos_alone = pos_active && !neg_active;
                    let neg_alone = neg_active && !pos_active;
                    if pos_alone {
                        self.leave_counter(now);
                        self.state = AxisState::StrafePos;
                        self.pos_peak = pos;
                        self.neg_peak = 0.0;
                    } else if neg_alone {
                        self.leave_counter(now);
                        self.state = AxisState::StrafeNeg;
                        self.neg_peak = neg;
                        self.pos_peak = 0.0;
                    }
                }
            }
        }

        if let Some(last) = self.jiggle_last {
            if now.duration_since(last) > Duration::from_millis(JIGGLE_WINDOW_MS) {
                self.is_jiggle = false;
            }
        }
    }

    fn enter_counter(&mut self, to: AxisState, now: Instant) {
        self.state = to;
        self.counter_start = Some(now);
        self.jiggle_times[self.jiggle_cursor] = Some(now);
        self.jiggle_cursor = (self.jiggle_cursor + 1) % JIGGLE_RING_SIZE;

        let recent = self
            .jiggle_times
            .iter()
            .filter_map(|t| *t)
            .filter(|t| now.duration_since(*t) <= Duration::from_millis(JIGGLE_WINDOW_MS))
            .count();
        if recent >= JIGGLE_MIN_COUNT {
            self.is_jiggle = true;
            self.jiggle_last = Some(now);
        }
    }

    fn leave_counter(&mut self, now: Instant) {
        if let Some(start) = self.counter_start.take() {
            let elapsed = now.duration_since(start).as_millis() as u64;
            self.counter_elapsed_ms = elapsed;
            self.counter_count += 1;
            self.counter_total_ms += elapsed;
        }
    }

    pub fn is_counter(&self) -> bool {
        matches!(self.state, AxisState::CounterPos | AxisState::CounterNeg)
    }

    /// Milliseconds since the current counter-strafe began, or `None` when
    /// the axis isn't in a counter state.
    pub fn counter_started_ms_ago(&self, now: Instant) -> Option<u64> {
        self.counter_start.map(|s| now.duration_since(s).as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> Axis {
        Axis::new(AxisConfig::default())
    }

    #[test]
    fn idle_to_strafe_pos_on_rising_edge() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 0.0, 0.0, 0.0, t0);
        assert_eq!(a.state, AxisState::StrafePos);
        assert_eq!(a.pos_peak, 1.0);
    }

    #[test]
    fn strafe_to_counter_on_opposite_rising_edge() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 0.0, 0.0, 0.0, t0);
        let t1 = t0 + Duration::from_millis(100);
        a.update(0.0, 1.0, 1.0, 0.0, t1);
        assert_eq!(a.state, AxisState::CounterNeg);
        assert_eq!(a.prev_state, AxisState::StrafePos);
    }

    #[test]
    fn counter_strafe_timing_is_recorded_on_release() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 0.0, 0.0, 0.0, t0); // IDLE -> STRAFE_POS
        let t1 = t0 + Duration::from_millis(100);
        a.update(0.0, 1.0, 1.0, 0.0, t1); // STRAFE_POS -> COUNTER_NEG
        let t2 = t1 + Duration::from_millis(15);
        a.update(0.0, 1.0, 0.0, 1.0, t2); // neg alone active -> STRAFE_NEG
        assert_eq!(a.state, AxisState::StrafeNeg);
        assert!(a.counter_elapsed_ms <= 15);
        assert_eq!(a.counter_count, 1);
    }

    #[test]
    fn both_inactive_returns_to_idle_and_clears_peaks() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 0.0, 0.0, 0.0, t0);
        let t1 = t0 + Duration::from_millis(10);
        a.update(0.0, 0.0, 1.0, 0.0, t1);
        assert_eq!(a.state, AxisState::Idle);
        assert_eq!(a.pos_peak, 0.0);
    }

    #[test]
    fn predictive_pre_arm_fires_on_partial_release() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(0.8, 0.0, 0.0, 0.0, t0);
        assert!(!a.predictive);
        let t1 = t0 + Duration::from_millis(10);
        a.update(0.5, 0.0, 0.8, 0.0, t1);
        assert!(a.predictive);
    }

    #[test]
    fn predictive_does_not_fire_below_min_peak() {
        let mut cfg = AxisConfig::default();
        cfg.predict_min_peak = 0.9;
        let mut a = Axis::new(cfg);
        let t0 = Instant::now();
        a.update(0.8, 0.0, 0.0, 0.0, t0);
        let t1 = t0 + Duration::from_millis(10);
        a.update(0.5, 0.0, 0.8, 0.0, t1);
        assert!(!a.predictive);
    }

    #[test]
    fn jiggle_detected_after_two_counter_strafes_within_window() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 0.0, 0.0, 0.0, t0);
        let t1 = t0 + Duration::from_millis(50);
        a.update(0.0, 1.0, 1.0, 0.0, t1); // counter #1
        assert!(!a.is_jiggle);
        let t2 = t1 + Duration::from_millis(20);
        a.update(1.0, 0.0, 0.0, 1.0, t2); // back to strafe pos
        let t3 = t2 + Duration::from_millis(50);
        a.update(0.0, 1.0, 1.0, 0.0, t3); // counter #2, within 300ms of #1
        assert!(a.is_jiggle);
    }

    #[test]
    fn jiggle_clears_after_window_elapses() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 0.0, 0.0, 0.0, t0);
        let t1 = t0 + Duration::from_millis(50);
        a.update(0.0, 1.0, 1.0, 0.0, t1);
        let t2 = t1 + Duration::from_millis(20);
        a.update(1.0, 0.0, 0.0, 1.0, t2);
        let t3 = t2 + Duration::from_millis(50);
        a.update(0.0, 1.0, 1.0, 0.0, t3);
        assert!(a.is_jiggle);

        let t4 = t3 + Duration::from_millis(400);
        a.update(0.0, 0.0, 0.0, 1.0, t4);
        assert!(!a.is_jiggle);
    }

    #[test]
    fn both_directions_simultaneously_never_enters_strafe_from_idle() {
        let mut a = axis();
        let t0 = Instant::now();
        a.update(1.0, 1.0, 0.0, 0.0, t0);
        assert_eq!(a.state, AxisState::Idle);
    }
}
