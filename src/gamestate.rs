/* Game-state cache: a minimal loopback HTTP server accepting CS2's Game
 * State Integration POSTs, plus emission of the GSI config file CS2 reads
 * to know where to send them. */
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::policy::{weapon_max_speed, WeaponCategory};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct GameStateSnapshot {
    pub weapon_name: String,
    pub weapon_type: String,
    pub weapon_category: WeaponCategory,
    pub weapon_speed: f32,
    pub round_phase: String,
    pub health: i32,
    pub connected: bool,
    pub last_update: Option<Instant>,
}

impl Default for GameStateSnapshot {
    fn default() -> Self {
        Self {
            weapon_name: String::new(),
            weapon_type: String::new(),
            weapon_category: WeaponCategory::Other,
            weapon_speed: 225.0,
            round_phase: String::new(),
            health: 100,
            connected: false,
            last_update: None,
        }
    }
}

/// Shared record, mutated only by the ingest thread and read atomically by
/// the main loop.
pub struct GameStateCache {
    inner: Mutex<GameStateSnapshot>,
}

impl GameStateCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(GameStateSnapshot::default()),
        })
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        self.inner.lock().expect("game-state mutex poisoned").clone()
    }

    fn update(&self, f: impl FnOnce(&mut GameStateSnapshot)) {
        let mut guard = self.inner.lock().expect("game-state mutex poisoned");
        f(&mut guard);
    }
}

/// Parse a GSI POST body and fold whatever is present into `cache`. Unknown
/// fields are ignored; a malformed payload discards the request without
/// touching the cached snapshot.
fn apply_payload(cache: &GameStateCache, body: &[u8]) {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            debug!("discarding malformed GSI payload: {e}");
            return;
        }
    };

    let round_phase = value.pointer("/round/phase").and_then(Value::as_str).map(str::to_string);
    let health = value.pointer("/player/state/health").and_then(Value::as_i64);

    let mut active_weapon: Option<(String, String)> = None;
    if let Some(weapons) = value.pointer("/player/weapons").and_then(Value::as_object) {
        for weapon in weapons.values() {
            if weapon.get("state").and_then(Value::as_str) == Some("active") {
                let name = weapon.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                let kind = weapon.get("type").and_then(Value::as_str).unwrap_or("").to_string();
                active_weapon = Some((name, kind));
                break;
            }
        }
    }

    cache.update(|snap| {
        snap.connected = true;
        snap.last_update = Some(Instant::now());
        if let Some(phase) = round_phase {
            snap.round_phase = phase;
        }
        if let Some(health) = health {
            snap.health = health as i32;
        }
        if let Some((name, kind)) = active_weapon {
            snap.weapon_speed = weapon_max_speed(&name);
            snap.weapon_category = WeaponCategory::from_gsi_type(&kind);
            snap.weapon_type = kind;
            snap.weapon_name = name;
        }
    });
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

fn handle_connection(mut stream: TcpStream, cache: &GameStateCache) {
    stream.set_read_timeout(Some(BODY_READ_TIMEOUT)).ok();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_headers_end(&buf) {
                    break pos;
                }
                if buf.len() > MAX_REQUEST_BYTES {
                    return;
                }
            }
            Err(_) => return,
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let body_len = content_length(&headers);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < body_len && body.len() < MAX_REQUEST_BYTES {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    body.truncate(body_len.min(body.len()));

    apply_payload(cache, &body);
    let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
}

/// Spawn the ingest thread. Bind failure is logged and returns an error;
/// callers proceed without game-state data (§7).
pub fn spawn_ingest_server(port: u16, cache: Arc<GameStateCache>, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .with_context(|| format!("failed to bind GSI listener on 127.0.0.1:{port}"))?;
    listener.set_nonblocking(true).context("failed to set listener non-blocking")?;

    Ok(thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _)) => handle_connection(stream, &cache),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("GSI accept error: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        debug!("GSI ingest thread exiting");
    }))
}

/// Write CS2's game state integration config file declaring where to POST
/// state and which fields to subscribe to. `config_dir` is provided by the
/// caller rather than auto-discovered (the original's Windows-registry
/// Steam-path probing is out of scope here).
pub fn write_integration_config(config_dir: &Path, gsi_port: u16) -> Result<PathBuf> {
    let path = config_dir.join("gamestate_integration_wooting_aim.cfg");
    let text = format!(
        "\"wooting-aim GSI Integration\"\n\
{{\n \
 \"uri\" \"http://127.0.0.1:{gsi_port}\"\n \
 \"timeout\" \"5.0\"\n \
 \"buffer\" \"0.1\"\n \
 \"throttle\" \"0.1\"\n \
 \"heartbeat\" \"30.0\"\n \
 \"data\"\n \
 {{\n  \
  \"provider\" \"1\"\n  \
  \"player_id\" \"1\"\n  \
  \"player_state\" \"1\"\n  \
  \"player_weapons\" \"1\"\n  \
  \"round\" \"1\"\n \
 }}\n\
}}\n"
    );
    std::fs::write(&path, &text).with_context(|| format!("failed writing GSI config to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_payload_extracts_round_phase_and_health() {
        let cache = GameStateCache::new();
        let body = br#"{"round":{"phase":"live"},"player":{"state":{"health":87}}}"#;
        apply_payload(&cache, body);
        let snap = cache.snapshot();
        assert_eq!(snap.round_phase, "live");
        assert_eq!(snap.health, 87);
        assert!(snap.connected);
    }

    #[test]
    fn apply_payload_finds_active_weapon_and_categorizes_it() {
        let cache = GameStateCache::new();
        let body = br#"{
            "player": {
                "weapons": {
                    "weapon_0": {"name": "weapon_knife", "type": "Knife", "state": "holstered"},
                    "weapon_1": {"name": "weapon_ak47", "type": "Rifle", "state": "active"}
                }
            }
        }"#;
        apply_payload(&cache, body);
        let snap = cache.snapshot();
        assert_eq!(snap.weapon_name, "weapon_ak47");
        assert_eq!(snap.weapon_category, WeaponCategory::Rifle);
        assert_eq!(snap.weapon_speed, 215.0);
    }

    #[test]
    fn apply_payload_discards_malformed_json_keeping_previous_snapshot() {
        let cache = GameStateCache::new();
        apply_payload(&cache, br#"{"round":{"phase":"live"}}"#);
        let before = cache.snapshot();
        apply_payload(&cache, b"not json at all {{{");
        let after = cache.snapshot();
        assert_eq!(before.round_phase, after.round_phase);
    }

    #[test]
    fn apply_payload_ignores_unknown_fields() {
        let cache = GameStateCache::new();
        apply_payload(&cache, br#"{"round":{"phase":"live","extra_field":123},"unrelated":true}"#);
        assert_eq!(cache.snapshot().round_phase, "live");
    }

    #[test]
    fn find_headers_end_locates_boundary() {
        let buf = b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}";
        let pos = find_headers_end(buf).unwrap();
        assert_eq!(&buf[pos + 4..], b"{}");
    }

    #[test]
    fn content_length_is_case_insensitive() {
        let headers = "POST / HTTP/1.1\r\ncontent-length: 42\r\nHost: x";
        assert_eq!(content_length(headers), 42);
    }

    #[test]
    fn content_length_defaults_to_zero_when_absent() {
        assert_eq!(content_length("POST / HTTP/1.1\r\nHost: x"), 0);
    }

    #[test]
    fn write_integration_config_declares_the_ingest_uri() {
        let dir = std::env::temp_dir().join("wooting-aim-test-gsi-cfg");
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_integration_config(&dir, 58732).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("http://127.0.0.1:58732"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
