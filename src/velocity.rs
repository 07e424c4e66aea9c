/* Discrete-time scalar velocity model matching the target game's server-side
 * friction/acceleration integration (64 Hz tick, binary key semantics). One
 * instance per axis. */

pub const TICKRATE_HZ: f32 = 64.0;
pub const TICK_DT: f32 = 1.0 / TICKRATE_HZ;

const FRICTION: f32 = 5.2;
const ACCELERATE: f32 = 5.5;
const STOPSPEED: f32 = 80.0;

const SNAP_ZERO: f32 = 0.5;
const MAX_DT: f32 = 0.1;

/// Which direction (if any) is being held this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wish {
    None,
    Pos,
    Neg,
}

impl Wish {
    fn sign(self) -> f32 {
        match self {
            Wish::None => 0.0,
            Wish::Pos => 1.0,
            Wish::Neg => -1.0,
        }
    }

    pub fn from_keys(pos_active: bool, neg_active: bool) -> Self {
        match (pos_active, neg_active) {
            (true, false) => Wish::Pos,
            (false, true) => Wish::Neg,
            _ => Wish::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VelocityEstimator {
    pub vel: f32,
    pub max_speed: f32,
}

impl VelocityEstimator {
    pub fn new(max_speed: f32) -> Self {
        Self { vel: 0.0, max_speed }
    }

    /// Advance by `dt` seconds given this tick's wish direction. Skipped
    /// entirely if `dt` is non-positive or implausibly large (a stall).
    pub fn update(&mut self, wish: Wish, dt: f32) {
        if dt <= 0.0 || dt > MAX_DT {
            return;
        }

        let speed = self.vel.abs();
        if speed > 0.001 {
            let control = speed.max(STOPSPEED);
            let drop = control * FRICTION * dt;
            let new_speed = (speed - drop).max(0.0);
            self.vel *= new_speed / speed;
        }

        let sign = wish.sign();
        if sign != 0.0 {
            let add = self.max_speed - self.vel * sign;
            if add > 0.0 {
                self.vel += add.min(ACCELERATE * dt * self.max_speed) * sign;
            }
        }

        self.vel = self.vel.clamp(-self.max_speed, self.max_speed);
        if self.vel.abs() < SNAP_ZERO {
            self.vel = 0.0;
        }
    }
}

/// Iterate the discrete model forward (assuming the counter-strafe
/// acceleration term holds for the whole look-ahead, per the design notes'
/// documented approximation) until total speed drops to `threshold` or 100
/// ticks elapse. Returns elapsed milliseconds.
pub fn time_to_accurate(vel_h: f32, vel_v: f32, max_speed: f32, counter_active: bool) -> f32 {
    let threshold = 0.34 * max_speed;
    let total = (vel_h * vel_h + vel_v * vel_v).sqrt();
    if total <= threshold {
        return 0.0;
    }

    let mut sim = total;
    let wish = if counter_active { Wish::Neg } else { Wish::None };
    for tick in 1..=100u32 {
        if sim > STOPSPEED {
            sim *= 0.91875;
        } else {
            sim = (sim - 6.5).max(0.0);
        }
        if wish != Wish::None {
            let accel_per_tick = ACCELERATE * TICK_DT * max_speed;
            sim = (sim - accel_per_tick).max(0.0);
        }
        if sim <= threshold {
            return tick as f32 * 15.625;
        }
    }
    100.0 * 15.625
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friction_only_decay_reaches_zero_in_expected_tick_range() {
        let mut v = VelocityEstimator::new(250.0);
        v.vel = 250.0;
        let mut ticks = 0;
        while v.vel.abs() > SNAP_ZERO && ticks < 200 {
            v.update(Wish::None, TICK_DT);
            ticks += 1;
        }
        assert!((20..=40).contains(&ticks), "expected 20-40 ticks, got {ticks}");
    }

    #[test]
    fn counter_strafe_reaches_accuracy_threshold_quickly() {
        let max_speed = 250.0;
        let mut v = VelocityEstimator::new(max_speed);
        v.vel = max_speed;
        let threshold = 0.34 * max_speed;
        let mut ticks = 0;
        while v.vel.abs() > threshold && ticks < 50 {
            v.update(Wish::Neg, TICK_DT);
            ticks += 1;
        }
        assert!((3..=12).contains(&ticks), "expected 3-12 ticks, got {ticks}");
    }

    #[test]
    fn counter_strafe_reaches_zero_quickly() {
        let max_speed = 250.0;
        let mut v = VelocityEstimator::new(max_speed);
        v.vel = max_speed;
        let mut ticks = 0;
        while v.vel.abs() > 0.0 && ticks < 50 {
            v.update(Wish::Neg, TICK_DT);
            ticks += 1;
        }
        assert!((5..=15).contains(&ticks), "expected 5-15 ticks, got {ticks}");
    }

    #[test]
    fn both_directions_yield_no_acceleration() {
        let mut v = VelocityEstimator::new(250.0);
        v.vel = 0.0;
        for _ in 0..10 {
            v.update(Wish::from_keys(true, true), TICK_DT);
        }
        assert_eq!(v.vel, 0.0);
    }

    #[test]
    fn velocity_stays_within_bounds() {
        let max_speed = 200.0;
        let mut v = VelocityEstimator::new(max_speed);
        for i in 0..1000 {
            let wish = if i % 37 < 10 { Wish::Pos } else { Wish::Neg };
            v.update(wish, TICK_DT);
            assert!(v.vel.abs() <= max_speed + f32::EPSILON);
        }
    }

    #[test]
    fn stale_dt_is_ignored() {
        let mut v = VelocityEstimator::new(200.0);
        v.vel = 50.0;
        v.update(Wish::Pos, 0.0);
        assert_eq!(v.vel, 50.0);
        v.update(Wish::Pos, 0.5);
        assert_eq!(v.vel, 50.0);
    }

    #[test]
    fn time_to_accurate_is_zero_when_already_under_threshold() {
        assert_eq!(time_to_accurate(10.0, 0.0, 250.0, false), 0.0);
    }

    #[test]
    fn time_to_accurate_counter_strafing_beats_coasting() {
        let coast = time_to_accurate(250.0, 0.0, 250.0, false);
        let counter = time_to_accurate(250.0, 0.0, 250.0, true);
        assert!(counter <= coast);
    }
}
