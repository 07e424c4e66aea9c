/* wooting-aim: adaptive actuation-point/rapid-trigger controller. Reads
 * analog key depth, classifies strafe/counter-strafe/jiggle movement per
 * axis, estimates in-game velocity, and pushes per-key AP/RT targets to the
 * keyboard in real time. */
mod analog;
mod axis;
mod config;
mod gamestate;
mod policy;
mod protocol;
mod shutdown;
mod stats;
mod velocity;
mod watchdog;
mod writer;

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use analog::{AnalogSource, Key, NullAnalogSource};
use axis::{Axis, AxisConfig, AxisState, DEAD_ZONE};
use config::Configuration;
use gamestate::GameStateCache;
use policy::{compute_targets, PolicyInputs, Targets, WeaponCategory};
use protocol::keyset::KeySetting;
use protocol::DeviceIo;
use shutdown::ShutdownGuard;
use stats::StatsLog;
use velocity::{time_to_accurate, VelocityEstimator, Wish};
use writer::RateLimitedWriter;

const PROFILE_INDEX: u8 = 0;
const DEMO_CYCLE_INTERVAL: Duration = Duration::from_secs(3);
const TARGET_PROCESS_NAME: &str = "cs2.exe";
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// wooting-aim -- adaptive actuation-point/rapid-trigger controller for
/// analog-optical keyboards.
#[derive(Parser)]
#[command(name = "wooting-aim", version, about)]
struct Cli {
    /// Enable adaptive GSI-driven policy and device writes (off by default;
    /// `--watch` enables it implicitly once the game process is detected).
    #[arg(long)]
    adaptive: bool,

    /// Only run while the target game process is detected.
    #[arg(long)]
    watch: bool,

    /// Cycle one key's AP/RT every few seconds instead of reading real input.
    #[arg(long)]
    demo: bool,

    /// Override the configuration file path.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(|| PathBuf::from("wooting-aim.cfg"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("wooting_aim=info".parse().unwrap()))
        .init();
}

fn run_demo(device: &mut DeviceIo, cfg: &Configuration, guard: &ShutdownGuard) -> Result<()> {
    info!("demo mode: cycling D key AP/RT every {:?}", DEMO_CYCLE_INTERVAL);
    let mut aggressive = false;
    while guard.is_running() {
        let (ap, rt) = if aggressive { (0.4, 0.1) } else { (1.2, 1.0) };
        let keys = [KeySetting::new(3, 3, ap)];
        let rt_keys = [KeySetting::new(3, 3, rt)];
        device.write_actuation(PROFILE_INDEX, &keys, false)?;
        device.write_rapid_trigger(PROFILE_INDEX, &rt_keys, false)?;
        info!("demo: D key ap={ap} rt={rt}");
        aggressive = !aggressive;
        thread::sleep(DEMO_CYCLE_INTERVAL);
    }
    guard.teardown_once(|| teardown(device, cfg));
    Ok(())
}

/// `std::thread::JoinHandle` has no timed join; the ingest thread already
/// polls its running flag every 500ms, so this just bounds how long we wait
/// for it to notice before giving up and exiting anyway.
fn join_with_timeout(handle: thread::JoinHandle<()>, timeout: Duration) {
    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    if rx.recv_timeout(timeout).is_err() {
        warn!("GSI ingest thread did not exit within the shutdown window");
    }
}

fn state_glyph(state: axis::AxisState) -> &'static str {
    match state {
        axis::AxisState::Idle => "-",
        axis::AxisState::StrafePos => ">",
        axis::AxisState::StrafeNeg => "<",
        axis::AxisState::CounterPos => "C>",
        axis::AxisState::CounterNeg => "<C",
    }
}

/// Single refreshing status line: axis states, GSI weapon/phase, current
/// AP/RT, write count, and velocity. Printed to stdout, separate from the
/// `tracing` diagnostics on stderr.
fn print_status_line(h: &Axis, v: &Axis, snapshot: &gamestate::GameStateSnapshot, targets: Targets, write_count: u64, vel_h: f32, vel_v: f32) {
    let tta = time_to_accurate(vel_h, vel_v, snapshot.weapon_speed.max(1.0), h.is_counter() || v.is_counter());
    print!(
        "\r[H {:>2}][V {:>2}] weapon={:<16} phase={:<10} ap={:.2}/{:.2}/{:.2}/{:.2} writes={} vel=({:.0},{:.0}) tta={:.0}ms   ",
        state_glyph(h.state),
        state_glyph(v.state),
        if snapshot.weapon_name.is_empty() { "-" } else { &snapshot.weapon_name },
        if snapshot.round_phase.is_empty() { "-" } else { &snapshot.round_phase },
        targets.ap[policy::IDX_W],
        targets.ap[policy::IDX_A],
        targets.ap[policy::IDX_S],
        targets.ap[policy::IDX_D],
        write_count,
        vel_h,
        vel_v,
        tta,
    );
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

/// Printed once on shutdown: counter-strafe counts/averages per axis and the
/// total number of device writes, matching the original's session recap.
fn print_session_summary(h: &Axis, v: &Axis, write_count: u64) {
    println!();
    println!("session summary:");
    println!(
        "  horizontal counter-strafes: {} (avg {} ms)",
        h.counter_count,
        if h.counter_count > 0 { h.counter_total_ms / h.counter_count } else { 0 }
    );
    println!(
        "  vertical counter-strafes:   {} (avg {} ms)",
        v.counter_count,
        if v.counter_count > 0 { v.counter_total_ms / v.counter_count } else { 0 }
    );
    println!("  device writes: {write_count}");
}

fn teardown(device: &DeviceIo, cfg: &Configuration) {
    info!("restoring normal-depth actuation before exit");
    let normal_ap = [
        KeySetting::new(2, 2, cfg.ap_normal),
        KeySetting::new(3, 1, cfg.ap_normal),
        KeySetting::new(3, 2, cfg.ap_normal),
        KeySetting::new(3, 3, cfg.ap_normal),
    ];
    let normal_rt = [
        KeySetting::new(2, 2, cfg.rt_normal),
        KeySetting::new(3, 1, cfg.rt_normal),
        KeySetting::new(3, 2, cfg.rt_normal),
        KeySetting::new(3, 3, cfg.rt_normal),
    ];
    if let Err(e) = device.write_actuation(PROFILE_INDEX, &normal_ap, false) {
        warn!("failed to restore actuation on shutdown: {e:#}");
    }
    if let Err(e) = device.write_rapid_trigger(PROFILE_INDEX, &normal_rt, false) {
        warn!("failed to restore rapid trigger on shutdown: {e:#}");
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = Configuration::load(&config_path(&cli)).context("loading configuration")?;

    let mut device = DeviceIo::open().context("opening Wooting device")?;
    device.handshake().context("device handshake")?;
    device.activate_profile(PROFILE_INDEX).context("activating profile")?;
    info!("device ready, profile {PROFILE_INDEX} active");

    let guard = ShutdownGuard::new();
    guard.install_handler()?;

    if cli.demo {
        return run_demo(&mut device, &cfg, &guard);
    }

    let gsi_running = guard.running_flag();
    let gsi_cache = GameStateCache::new();
    let gsi_handle = if cli.adaptive && cfg.gsi_enabled {
        match gamestate::write_integration_config(&PathBuf::from("."), cfg.gsi_port) {
            Ok(path) => info!("wrote GSI integration config to {}", path.display()),
            Err(e) => warn!("failed to write GSI integration config: {e:#}"),
        }
        match gamestate::spawn_ingest_server(cfg.gsi_port, gsi_cache.clone(), gsi_running) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("GSI ingest server disabled: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let mut stats = StatsLog::open(&PathBuf::from("counter-strafe-stats.csv"), cfg.stats_enabled)
        .context("opening stats log")?;

    let mut analog: Box<dyn AnalogSource> = Box::new(NullAnalogSource);

    let mut h_axis = Axis::new(AxisConfig {
        predict_threshold: cfg.predict_threshold,
        predict_min_peak: cfg.predict_min_peak,
    });
    let mut v_axis = Axis::new(AxisConfig {
        predict_threshold: cfg.predict_threshold,
        predict_min_peak: cfg.predict_min_peak,
    });
    let mut vel_h = VelocityEstimator::new(225.0);
    let mut vel_v = VelocityEstimator::new(225.0);

    let mut writer = RateLimitedWriter::new(Targets::normal(&cfg), cfg.write_interval_ms);

    let tick_dt = Duration::from_secs_f32(1.0 / cfg.poll_rate_hz.max(1.0));
    let mut prev_w = 0.0;
    let mut prev_a = 0.0;
    let mut prev_s = 0.0;
    let mut prev_d = 0.0;
    let mut last_tick = Instant::now();
    let mut last_status = Instant::now() - STATUS_INTERVAL;

    while guard.is_running() {
        if cli.watch && !watchdog::is_process_running(TARGET_PROCESS_NAME) {
            thread::sleep(watchdog::WATCH_POLL_INTERVAL);
            continue;
        }
        // `--watch` only reaches this point once the game process is confirmed
        // running, so it enables policy+writing exactly like `--adaptive`.
        let policy_enabled = cli.adaptive || cli.watch;

        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        let w = analog.read(Key::W);
        let a = analog.read(Key::A);
        let s = analog.read(Key::S);
        let d = analog.read(Key::D);
        let crouching = analog.read(Key::Ctrl) > DEAD_ZONE;

        h_axis.update(d, a, prev_d, prev_a, now);
        v_axis.update(w, s, prev_w, prev_s, now);

        let snapshot = gsi_cache.snapshot();
        let weapon_speed = if snapshot.weapon_speed > 0.0 { snapshot.weapon_speed } else { 225.0 };
        vel_h.max_speed = weapon_speed;
        vel_v.max_speed = weapon_speed;
        vel_h.update(Wish::from_keys(d > 0.01, a > 0.01), dt);
        vel_v.update(Wish::from_keys(w > 0.01, s > 0.01), dt);

        let gsi_connected = policy_enabled && cfg.gsi_enabled && snapshot.connected;

        if policy_enabled {
            let inputs = PolicyInputs {
                h: &h_axis,
                v: &v_axis,
                crouching,
                vel_h: vel_h.vel,
                vel_v: vel_v.vel,
                weapon_category: if gsi_connected { snapshot.weapon_category } else { WeaponCategory::Other },
                weapon_speed,
                gsi_connected,
                round_phase: &snapshot.round_phase,
                now,
            };
            let targets = compute_targets(&cfg, &inputs);

            match writer.maybe_write(&device, PROFILE_INDEX, targets, now) {
                Ok(_) => {}
                Err(e) => warn!("write failed: {e:#}"),
            }
        }

        if h_axis.prev_state != h_axis.state && matches!(h_axis.prev_state, AxisState::CounterPos | AxisState::CounterNeg) {
            let direction = if h_axis.prev_state == AxisState::CounterPos { stats::Direction::D } else { stats::Direction::A };
            stats.log_counter_strafe(stats::StatsAxis::Horizontal, direction, h_axis.counter_elapsed_ms, &snapshot.weapon_name);
        }
        if v_axis.prev_state != v_axis.state && matches!(v_axis.prev_state, AxisState::CounterPos | AxisState::CounterNeg) {
            let direction = if v_axis.prev_state == AxisState::CounterPos { stats::Direction::W } else { stats::Direction::S };
            stats.log_counter_strafe(stats::StatsAxis::Vertical, direction, v_axis.counter_elapsed_ms, &snapshot.weapon_name);
        }

        if now.duration_since(last_status) >= STATUS_INTERVAL {
            print_status_line(&h_axis, &v_axis, &snapshot, writer.current(), writer.write_count, vel_h.vel, vel_v.vel);
            last_status = now;
        }

        prev_w = w;
        prev_a = a;
        prev_s = s;
        prev_d = d;

        thread::sleep(tick_dt);
    }

    print_session_summary(&h_axis, &v_axis, writer.write_count);
    guard.teardown_once(|| teardown(&device, &cfg));

    if let Some(handle) = gsi_handle {
        join_with_timeout(handle, Duration::from_secs(3));
    }

    info!("shutdown complete");
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}
