/* Adaptive policy: maps (axis state, velocity, crouch, weapon, round phase)
 * to per-key actuation-point / rapid-trigger targets. */
use std::time::Instant;

use crate::axis::{Axis, AxisState};
use crate::config::Configuration;

pub const IDX_W: usize = 0;
pub const IDX_A: usize = 1;
pub const IDX_S: usize = 2;
pub const IDX_D: usize = 3;

/// Above this fraction of the accuracy threshold, AP scales toward the
/// aggressive floor with velocity.
const VEL_AGGRO_ZONE: f32 = 0.50;
/// At peak velocity, AP bottoms out at `base_ap * VEL_MIN_AP_FACTOR`.
const VEL_MIN_AP_FACTOR: f32 = 0.5;
const PHASE_ULTRA_MS: f32 = 80.0;
const PHASE_DECAY_MS: f32 = 200.0;
/// Below this, stem wobble alone produces phantom triggers.
const MIN_AP: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponCategory {
    Rifle,
    Awp,
    Pistol,
    Smg,
    Knife,
    Other,
}

impl WeaponCategory {
    /// CS2 GSI's `player.weapons.weapon_N.type` string.
    pub fn from_gsi_type(weapon_type: &str) -> Self {
        match weapon_type {
            "Rifle" | "Machine Gun" => WeaponCategory::Rifle,
            "SniperRifle" => WeaponCategory::Awp,
            "Pistol" => WeaponCategory::Pistol,
            "Submachine Gun" | "Shotgun" => WeaponCategory::Smg,
            "Knife" => WeaponCategory::Knife,
            _ => WeaponCategory::Other,
        }
    }

    fn base(self, cfg: &Configuration) -> (f32, f32) {
        match self {
            WeaponCategory::Rifle => (cfg.rifle_ap, cfg.rifle_rt),
            WeaponCategory::Awp => (cfg.awp_ap, cfg.awp_rt),
            WeaponCategory::Pistol => (cfg.pistol_ap, cfg.pistol_rt),
            WeaponCategory::Smg => (cfg.smg_ap, cfg.smg_rt),
            WeaponCategory::Knife => (cfg.knife_ap, cfg.knife_rt),
            WeaponCategory::Other => (cfg.ap_aggro, cfg.rt_aggro),
        }
    }
}

/// Substring match on the GSI weapon name (e.g. `weapon_ak47`); default
/// covers anything unmatched, including an empty/unknown name.
pub fn weapon_max_speed(name: &str) -> f32 {
    if name.is_empty() {
        return 225.0;
    }
    if name.contains("knife") || name.contains("bayonet") {
        return 250.0;
    }
    if name.contains("awp") {
        return 200.0;
    }
    if name.contains("ak47") {
        return 215.0;
    }
    if name.contains("m4a1") {
        return 225.0;
    }
    if name.contains("deagle") || name.contains("revolver") {
        return 230.0;
    }
    if name.contains("ssg08") {
        return 230.0;
    }
    if name.contains("g3sg1") || name.contains("scar20") {
        return 215.0;
    }
    if name.contains("galil") {
        return 215.0;
    }
    if name.contains("famas") {
        return 220.0;
    }
    if name.contains("aug") {
        return 220.0;
    }
    if name.contains("sg556") {
        return 210.0;
    }
    if name.contains("glock")
        || name.contains("hkp2000")
        || name.contains("usp")
        || name.contains("p250")
        || name.contains("fiveseven")
        || name.contains("tec9")
        || name.contains("cz75")
        || name.contains("elite")
    {
        return 240.0;
    }
    if name.contains("mp9") || name.contains("mac10") || name.contains("bizon") {
        return 240.0;
    }
    if name.contains("ump45") || name.contains("p90") {
        return 230.0;
    }
    if name.contains("mp7") || name.contains("mp5") {
        return 220.0;
    }
    if name.contains("negev") {
        return 150.0;
    }
    if name.contains("m249") {
        return 195.0;
    }
    if name.contains("nova") || name.contains("mag7") || name.contains("sawedoff") {
        return 220.0;
    }
    if name.contains("xm1014") {
        return 215.0;
    }
    if name.contains("c4")
        || name.contains("flashbang")
        || name.contains("hegrenade")
        || name.contains("smokegrenade")
        || name.contains("molotov")
        || name.contains("incgrenade")
        || name.contains("decoy")
    {
        return 245.0;
    }
    225.0
}

fn vel_scale_ap(base_ap: f32, vel_ratio: f32) -> f32 {
    if vel_ratio < VEL_AGGRO_ZONE {
        return base_ap;
    }
    let t = (vel_ratio - VEL_AGGRO_ZONE) / (1.0 - VEL_AGGRO_ZONE);
    let factor = 1.0 - t * (1.0 - VEL_MIN_AP_FACTOR);
    (base_ap * factor).max(MIN_AP)
}

fn phase_decay_ap(base_ap: f32, counter_ms: f32) -> f32 {
    if counter_ms < PHASE_ULTRA_MS {
        return MIN_AP;
    }
    if counter_ms > PHASE_DECAY_MS {
        return base_ap;
    }
    let t = (counter_ms - PHASE_ULTRA_MS) / (PHASE_DECAY_MS - PHASE_ULTRA_MS);
    MIN_AP + t * (base_ap - MIN_AP)
}

/// Four `{AP, RT}` pairs indexed by `IDX_W/A/S/D`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Targets {
    pub ap: [f32; 4],
    pub rt: [f32; 4],
}

impl Targets {
    pub fn normal(cfg: &Configuration) -> Self {
        Self {
            ap: [cfg.ap_normal; 4],
            rt: [cfg.rt_normal; 4],
        }
    }
}

/// Live per-tick state the policy reads; everything not carried on `Axis`
/// itself.
pub struct PolicyInputs<'a> {
    pub h: &'a Axis,
    pub v: &'a Axis,
    pub crouching: bool,
    pub vel_h: f32,
    pub vel_v: f32,
    pub weapon_category: WeaponCategory,
    pub weapon_speed: f32,
    pub gsi_connected: bool,
    pub round_phase: &'a str,
    pub now: Instant,
}

#[allow(clippy::too_many_arguments)]
fn apply_axis_rule(
    state: AxisState,
    predictive: bool,
    is_jiggle: bool,
    jiggle_enabled: bool,
    vel_ap: f32,
    base_rt: f32,
    phase_decay_enabled: bool,
    counter_ms: f32,
    pos_idx: usize,
    neg_idx: usize,
    ap: &mut [f32; 4],
    rt: &mut [f32; 4],
) {
    match state {
        AxisState::Idle => {
            if jiggle_enabled && is_jiggle {
                ap[pos_idx] = vel_ap;
                rt[pos_idx] = base_rt;
                ap[neg_idx] = vel_ap;
                rt[neg_idx] = base_rt;
            }
        }
        AxisState::StrafePos => {
            rt[pos_idx] = base_rt;
            ap[neg_idx] = vel_ap;
            if predictive || (jiggle_enabled && is_jiggle) {
                rt[neg_idx] = base_rt;
            }
        }
        AxisState::StrafeNeg => {
            rt[neg_idx] = base_rt;
            ap[pos_idx] = vel_ap;
            if predictive || (jiggle_enabled && is_jiggle) {
                rt[pos_idx] = base_rt;
            }
        }
        AxisState::CounterPos => {
            let c_ap = if phase_decay_enabled {
                phase_decay_ap(vel_ap, counter_ms)
            } else {
                vel_ap
            };
            ap[pos_idx] = c_ap;
            rt[pos_idx] = base_rt;
            rt[neg_idx] = base_rt;
        }
        AxisState::CounterNeg => {
            let c_ap = if phase_decay_enabled {
                phase_decay_ap(vel_ap, counter_ms)
            } else {
                vel_ap
            };
            ap[neg_idx] = c_ap;
            rt[neg_idx] = base_rt;
            rt[pos_idx] = base_rt;
        }
    }
}

/// Compute the four key targets for this tick.
pub fn compute_targets(cfg: &Configuration, inputs: &PolicyInputs) -> Targets {
    let freezetime = inputs.gsi_connected
        && (inputs.round_phase == "freezetime" || inputs.round_phase == "over");
    let non_combat = inputs.gsi_connected && inputs.weapon_category == WeaponCategory::Other;

    let mut targets = Targets::normal(cfg);
    if freezetime || non_combat {
        return targets;
    }

    let (base_ap, base_rt) = if inputs.gsi_connected {
        inputs.weapon_category.base(cfg)
    } else {
        (cfg.ap_aggro, cfg.rt_aggro)
    };

    let mut vel_ap = base_ap;
    if cfg.vel_enabled && cfg.vel_scale_enabled {
        let total_vel = (inputs.vel_h * inputs.vel_h + inputs.vel_v * inputs.vel_v).sqrt();
        let max_speed = if inputs.weapon_speed > 0.0 { inputs.weapon_speed } else { 225.0 };
        let threshold = max_speed * 0.34;
        let vel_ratio = if threshold > 0.0 { (total_vel / threshold).min(1.0) } else { 0.0 };
        vel_ap = vel_scale_ap(base_ap, vel_ratio);
    }

    apply_axis_rule(
        inputs.h.state,
        inputs.h.predictive,
        inputs.h.is_jiggle,
        cfg.jiggle_enabled,
        vel_ap,
        base_rt,
        cfg.phase_decay,
        inputs.h.counter_started_ms_ago(inputs.now).unwrap_or(0) as f32,
        IDX_D,
        IDX_A,
        &mut targets.ap,
        &mut targets.rt,
    );

    if cfg.ws_adaptive {
        apply_axis_rule(
            inputs.v.state,
            inputs.v.predictive,
            inputs.v.is_jiggle,
            cfg.jiggle_enabled,
            vel_ap,
            base_rt,
            cfg.phase_decay,
            inputs.v.counter_started_ms_ago(inputs.now).unwrap_or(0) as f32,
            IDX_W,
            IDX_S,
            &mut targets.ap,
            &mut targets.rt,
        );
    }

    if inputs.crouching {
        for i in 0..4 {
            let crt = (targets.rt[i] * cfg.crouch_rt_factor).max(base_rt);
            targets.rt[i] = crt;
            if targets.ap[i] < cfg.ap_normal {
                targets.ap[i] += (cfg.ap_normal - targets.ap[i]) * 0.3;
            }
        }
    }

    targets
}
