/* Rate-limited writer: coalesces AP/RT target changes so the device sees at
 * most one consistent pair every `write_interval_ms`, instead of a write per
 * policy tick. */
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use crate::policy::{Targets, IDX_A, IDX_D, IDX_S, IDX_W};
use crate::protocol::{DeviceIo, KeySetting};

const KEY_W: (u8, u8) = (2, 2);
const KEY_A: (u8, u8) = (3, 1);
const KEY_S: (u8, u8) = (3, 2);
const KEY_D: (u8, u8) = (3, 3);

fn should_write(current: Targets, target: Targets, last_write: Option<Instant>, write_interval_ms: u64, now: Instant) -> bool {
    if target == current {
        return false;
    }
    match last_write {
        Some(last) => now.duration_since(last).as_millis() >= write_interval_ms as u128,
        None => true,
    }
}

pub struct RateLimitedWriter {
    current: Targets,
    last_write: Option<Instant>,
    write_interval_ms: u64,
    pub write_count: u64,
}

impl RateLimitedWriter {
    pub fn new(initial: Targets, write_interval_ms: u64) -> Self {
        Self {
            current: initial,
            last_write: None,
            write_interval_ms,
            write_count: 0,
        }
    }

    /// Push `target` to the device if it differs from the last-written
    /// value and the coalescing interval has elapsed. `save` is always
    /// `false` here — flash persistence goes through `DeviceIo::save_to_flash`
    /// explicitly.
    pub fn maybe_write(&mut self, device: &DeviceIo, profile: u8, target: Targets, now: Instant) -> Result<bool> {
        if !should_write(self.current, target, self.last_write, self.write_interval_ms, now) {
            return Ok(false);
        }

        let ap_keys = [
            KeySetting::new(KEY_W.0, KEY_W.1, target.ap[IDX_W]),
            KeySetting::new(KEY_A.0, KEY_A.1, target.ap[IDX_A]),
            KeySetting::new(KEY_S.0, KEY_S.1, target.ap[IDX_S]),
            KeySetting::new(KEY_D.0, KEY_D.1, target.ap[IDX_D]),
        ];
        let rt_keys = [
            KeySetting::new(KEY_W.0, KEY_W.1, target.rt[IDX_W]),
            KeySetting::new(KEY_A.0, KEY_A.1, target.rt[IDX_A]),
            KeySetting::new(KEY_S.0, KEY_S.1, target.rt[IDX_S]),
            KeySetting::new(KEY_D.0, KEY_D.1, target.rt[IDX_D]),
        ];

        device
            .write_actuation(profile, &ap_keys, false)
            .context("writing actuation targets")?;
        device
            .write_rapid_trigger(profile, &rt_keys, false)
            .context("writing rapid-trigger targets")?;

        self.current = target;
        self.last_write = Some(now);
        self.write_count += 1;
        debug!("wrote target #{} ap={:?} rt={:?}", self.write_count, target.ap, target.rt);
        Ok(true)
    }

    pub fn current(&self) -> Targets {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(ap: f32, rt: f32) -> Targets {
        Targets {
            ap: [ap; 4],
            rt: [rt; 4],
        }
    }

    #[test]
    fn identical_target_is_a_no_op() {
        let t = targets(1.2, 1.0);
        let w = RateLimitedWriter::new(t, 50);
        assert_eq!(w.current(), t);
        assert_eq!(w.write_count, 0);
        assert!(!should_write(t, t, None, 50, Instant::now()));
    }

    #[test]
    fn first_write_is_never_rate_limited() {
        assert!(should_write(targets(1.2, 1.0), targets(0.4, 0.1), None, 50, Instant::now()));
    }

    #[test]
    fn interval_gate_blocks_consecutive_writes() {
        let t0 = Instant::now();
        let t1 = t0 + std::time::Duration::from_millis(10);
        assert!(!should_write(targets(1.2, 1.0), targets(0.4, 0.1), Some(t0), 50, t1));
    }

    #[test]
    fn interval_gate_releases_after_the_coalescing_window() {
        let t0 = Instant::now();
        let t1 = t0 + std::time::Duration::from_millis(51);
        assert!(should_write(targets(1.2, 1.0), targets(0.4, 0.1), Some(t0), 50, t1));
    }
}
