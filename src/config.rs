/* Process-wide configuration loaded from `wooting-aim.cfg` (key=value,
 * `#` comments). Auto-created with defaults on first run; immutable after
 * load — handed to the main loop as an owned value. */
use std::path::Path;

use anyhow::{Context, Result};
use configparser::ini::Ini;
use tracing::{debug, warn};

const DEFAULT_SECTION: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub ap_normal: f32,
    pub ap_aggro: f32,
    pub rt_normal: f32,
    pub rt_aggro: f32,
    pub write_interval_ms: u64,
    pub predict_threshold: f32,
    pub predict_min_peak: f32,
    pub crouch_rt_factor: f32,
    pub ws_adaptive: bool,
    pub stats_enabled: bool,

    pub rifle_ap: f32,
    pub rifle_rt: f32,
    pub awp_ap: f32,
    pub awp_rt: f32,
    pub pistol_ap: f32,
    pub pistol_rt: f32,
    pub smg_ap: f32,
    pub smg_rt: f32,
    pub knife_ap: f32,
    pub knife_rt: f32,

    pub gsi_enabled: bool,
    pub gsi_port: u16,

    pub vel_enabled: bool,
    pub vel_scale_enabled: bool,
    pub jiggle_enabled: bool,
    pub phase_decay: bool,

    pub poll_rate_hz: f32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ap_normal: 1.2,
            ap_aggro: 0.4,
            rt_normal: 1.0,
            rt_aggro: 0.1,
            write_interval_ms: 50,
            predict_threshold: 0.70,
            predict_min_peak: 0.30,
            crouch_rt_factor: 0.5,
            ws_adaptive: false,
            stats_enabled: true,

            rifle_ap: 0.4,
            rifle_rt: 0.1,
            awp_ap: 0.8,
            awp_rt: 0.4,
            pistol_ap: 0.3,
            pistol_rt: 0.1,
            smg_ap: 0.5,
            smg_rt: 0.2,
            knife_ap: 1.5,
            knife_rt: 1.0,

            gsi_enabled: true,
            gsi_port: 58732,

            vel_enabled: true,
            vel_scale_enabled: true,
            jiggle_enabled: true,
            phase_decay: true,

            poll_rate_hz: 8000.0,
        }
    }
}

impl Configuration {
    /// Load from `path`, writing it with defaults first if it doesn't exist.
    /// Unknown or malformed lines are skipped silently — defaults survive.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let cfg = Self::default();
            cfg.write_default(path)
                .with_context(|| format!("failed writing default config to {}", path.display()))?;
            return Ok(cfg);
        }

        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;

        let mut cfg = Self::default();

        macro_rules! set_f32 {
            ($field:ident, $key:literal) => {
                if let Ok(Some(v)) = ini.getfloat(DEFAULT_SECTION, $key) {
                    cfg.$field = v as f32;
                }
            };
        }
        macro_rules! set_bool {
            ($field:ident, $key:literal) => {
                if let Ok(Some(v)) = ini.getint(DEFAULT_SECTION, $key) {
                    cfg.$field = v != 0;
                }
            };
        }

        set_f32!(ap_normal, "ap_normal");
        set_f32!(ap_aggro, "ap_aggro");
        set_f32!(rt_normal, "rt_normal");
        set_f32!(rt_aggro, "rt_aggro");
        if let Ok(Some(v)) = ini.getint(DEFAULT_SECTION, "write_interval_ms") {
            cfg.write_interval_ms = v.max(0) as u64;
        }
        set_f32!(predict_threshold, "predict_threshold");
        set_f32!(predict_min_peak, "predict_min_peak");
        set_f32!(crouch_rt_factor, "crouch_rt_factor");
        set_bool!(ws_adaptive, "ws_adaptive");
        set_bool!(stats_enabled, "stats_enabled");

        set_f32!(rifle_ap, "rifle_ap");
        set_f32!(rifle_rt, "rifle_rt");
        set_f32!(awp_ap, "awp_ap");
        set_f32!(awp_rt, "awp_rt");
        set_f32!(pistol_ap, "pistol_ap");
        set_f32!(pistol_rt, "pistol_rt");
        set_f32!(smg_ap, "smg_ap");
        set_f32!(smg_rt, "smg_rt");
        set_f32!(knife_ap, "knife_ap");
        set_f32!(knife_rt, "knife_rt");

        set_bool!(gsi_enabled, "gsi_enabled");
        if let Ok(Some(v)) = ini.getint(DEFAULT_SECTION, "gsi_port") {
            cfg.gsi_port = v.clamp(0, u16::MAX as i64) as u16;
        }

        set_bool!(vel_enabled, "vel_enabled");
        set_bool!(vel_scale_enabled, "vel_scale_enabled");
        set_bool!(jiggle_enabled, "jiggle_enabled");
        set_bool!(phase_decay, "phase_decay");
        set_f32!(poll_rate_hz, "poll_rate_hz");

        debug!("loaded configuration from {}", path.display());
        Ok(cfg)
    }

    fn write_default(&self, path: &Path) -> Result<()> {
        let text = format!(
            "# wooting-aim configuration -- auto-generated, edit freely.\n\
ap_normal={}\nap_aggro={}\nrt_normal={}\nrt_aggro={}\nwrite_interval_ms={}\n\
predict_threshold={}\npredict_min_peak={}\ncrouch_rt_factor={}\nws_adaptive={}\nstats_enabled={}\n\n\
rifle_ap={}\nrifle_rt={}\nawp_ap={}\nawp_rt={}\npistol_ap={}\npistol_rt={}\n\
smg_ap={}\nsmg_rt={}\nknife_ap={}\nknife_rt={}\n\n\
gsi_enabled={}\ngsi_port={}\n\n\
vel_enabled={}\nvel_scale_enabled={}\njiggle_enabled={}\nphase_decay={}\npoll_rate_hz={}\n",
            self.ap_normal,
            self.ap_aggro,
            self.rt_normal,
            self.rt_aggro,
            self.write_interval_ms,
            self.predict_threshold,
            self.predict_min_peak,
            self.crouch_rt_factor,
            self.ws_adaptive as u8,
            self.stats_enabled as u8,
            self.rifle_ap,
            self.rifle_rt,
            self.awp_ap,
            self.awp_rt,
            self.pistol_ap,
            self.pistol_rt,
            self.smg_ap,
            self.smg_rt,
            self.knife_ap,
            self.knife_rt,
            self.gsi_enabled as u8,
            self.gsi_port,
            self.vel_enabled as u8,
            self.vel_scale_enabled as u8,
            self.jiggle_enabled as u8,
            self.phase_decay as u8,
            self.poll_rate_hz,
        );
        std::fs::write(path, text)?;
        warn!("wrote default configuration to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Configuration::default();
        assert_eq!(cfg.ap_normal, 1.2);
        assert_eq!(cfg.ap_aggro, 0.4);
        assert_eq!(cfg.write_interval_ms, 50);
        assert_eq!(cfg.gsi_port, 58732);
        assert!(cfg.vel_enabled);
        assert!(!cfg.ws_adaptive);
    }

    #[test]
    fn load_creates_default_file_when_missing() {
        let dir = std::env::temp_dir().join("wooting-aim-test-defaults");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wooting-aim.cfg");
        let _ = std::fs::remove_file(&path);

        let cfg = Configuration::load(&path).unwrap();
        assert_eq!(cfg, Configuration::default());
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_overrides_known_keys_and_skips_unknown() {
        let dir = std::env::temp_dir().join("wooting-aim-test-override");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wooting-aim.cfg");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# a comment").unwrap();
        writeln!(f, "ap_normal=2.5").unwrap();
        writeln!(f, "ws_adaptive=1").unwrap();
        writeln!(f, "totally_bogus_key=123").unwrap();
        drop(f);

        let cfg = Configuration::load(&path).unwrap();
        assert_eq!(cfg.ap_normal, 2.5);
        assert!(cfg.ws_adaptive);
        assert_eq!(cfg.rt_normal, Configuration::default().rt_normal);
        std::fs::remove_dir_all(&dir).ok();
    }
}
