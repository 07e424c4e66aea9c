/* HID wire protocol: vendor magic bytes, report-ID sizing, feature-report
 * commands, data-frame writes/reads, and the handshake/profile/actuation/
 * rapid-trigger/flash operations built on top of them. */

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use hidapi::{HidApi, HidDevice};
use thiserror::Error;
use tracing::{debug, warn};

use super::keyset::KeySetting;
use super::varint::build_partial_key_map;

const VENDOR_ID: u16 = 0x31E3;
const USAGE_PAGE: u16 = 0xFF55;
const MAGIC: [u8; 2] = [0xD1, 0xDA];

const CMD_ACTUATION: u8 = 21;
const CMD_ACTIVATE_PROFILE: u8 = 23;
const CMD_RAPID_TRIGGER: u8 = 25;
/// Reloading a profile discards RAM writes, so `activate_profile` never
/// issues this command; kept for documentation of the on-wire surface.
#[allow(dead_code)]
const CMD_RELOAD_PROFILE: u8 = 38;
const CMD_HANDSHAKE: u8 = 39;
const CMD_SAVE_PROFILE: u8 = 42;
const CMD_GET_ACTUATION: u8 = 49;
const CMD_GET_RT: u8 = 54;

const STATUS_SUCCESS: u8 = 0x88;
#[allow(dead_code)]
const STATUS_BUSY: u8 = 0x77;
#[allow(dead_code)]
const STATUS_UNSUPPORTED: u8 = 0xAA;

const HANDSHAKE_MAGIC: u32 = 0x7A45_465E;

/// Report ID -> payload capacity in bytes, excluding the report-ID byte
/// itself. The smallest report whose capacity fits a given frame is always
/// selected, so smaller writes don't pay for a larger buffer's padding.
const REPORT_SIZES: [(u8, usize); 6] = [(1, 32), (2, 62), (3, 254), (4, 510), (5, 1022), (6, 2046)];

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Wooting device found on usage page {page:#06x}")]
    NotFound { page: u16 },

    #[error("HID I/O failure: {0}")]
    Io(#[from] hidapi::HidError),

    #[error("response framing error: expected magic {0:02x?}, got {1:02x?}")]
    BadMagic([u8; 2], [u8; 2]),

    #[error("response too short: {0} bytes")]
    ShortResponse(usize),

    #[error("device reported non-success status {0:#04x}")]
    Status(u8),

    #[error("no report id fits a {0}-byte payload")]
    PayloadTooLarge(usize),
}

/// Parsed response frame: `[magic(2), cmd_echo, status, body_len(2), body...]`.
#[derive(Debug, Clone)]
pub struct Response {
    pub cmd_echo: u8,
    pub status: u8,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

pub fn parse_response(buf: &[u8]) -> Result<Response, TransportError> {
    if buf.len() < 6 {
        return Err(TransportError::ShortResponse(buf.len()));
    }
    if buf[0] != MAGIC[0] || buf[1] != MAGIC[1] {
        return Err(TransportError::BadMagic(MAGIC, [buf[0], buf[1]]));
    }
    let body_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
    let body_len = body_len.min(buf.len() - 6);
    Ok(Response {
        cmd_echo: buf[2],
        status: buf[3],
        body: buf[6..6 + body_len].to_vec(),
    })
}

/// Smallest report id whose capacity covers `payload_len` bytes of framed
/// content (everything after the report-id byte).
pub fn pick_report_id(payload_len: usize) -> Result<(u8, usize), TransportError> {
    REPORT_SIZES
        .iter()
        .find(|(_, cap)| *cap >= payload_len)
        .copied()
        .ok_or(TransportError::PayloadTooLarge(payload_len))
}

fn build_command_frame(cmd: u8, param: u32) -> [u8; 9] {
    let p = param.to_le_bytes();
    [0x01, MAGIC[0], MAGIC[1], cmd, p[0], p[1], p[2], p[3], 0x00]
}

fn build_data_frame(report_id: u8, capacity: usize, cmd: u8, options: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(capacity + 1);
    out.push(report_id);
    out.push(MAGIC[0]);
    out.push(MAGIC[1]);
    out.push(cmd);
    out.push(options);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(capacity + 1, 0);
    out
}

/// Owns the open HID handle and the cached active-profile index. All device
/// I/O for the controller goes through this type.
pub struct DeviceIo {
    device: HidDevice,
    active_profile: Option<u8>,
}

impl DeviceIo {
    /// Enumerate Wooting vendor interfaces, select usage page `0xFF55`, and
    /// open it in non-blocking mode. Fails if no matching interface exists.
    pub fn open() -> Result<Self> {
        let api = HidApi::new().context("failed to initialize HID API")?;
        let info = api
            .device_list()
            .find(|d| d.vendor_id() == VENDOR_ID && d.usage_page() == USAGE_PAGE)
            .ok_or(TransportError::NotFound { page: USAGE_PAGE })?;
        let path = info.path().to_owned();
        let device = api
            .open_path(&path)
            .with_context(|| format!("failed to open {path:?}"))?;
        device
            .set_blocking_mode(false)
            .context("failed to set non-blocking mode")?;
        debug!("opened Wooting device at {path:?}");
        Ok(Self {
            device,
            active_profile: None,
        })
    }

    fn send_command(&self, cmd: u8, param: u32) -> Result<Response> {
        let frame = build_command_frame(cmd, param);
        self.device
            .send_feature_report(&frame)
            .context("feature report write failed")?;

        let mut buf = [0u8; 9];
        buf[0] = 0x01;
        let n = self
            .device
            .get_feature_report(&mut buf)
            .context("feature report read failed")?;
        let resp = parse_response(&buf[1..n]).context("parsing feature response")?;
        debug!("cmd {cmd} -> status {:#04x}, {} body byte(s)", resp.status, resp.body.len());
        Ok(resp)
    }

    fn send_data(&self, report_id: u8, capacity: usize, cmd: u8, options: u8, payload: &[u8], save: bool) -> Result<()> {
        let frame = build_data_frame(report_id, capacity, cmd, options, payload);
        self.device.write(&frame).context("data frame write failed")?;

        let sleep_ms = if save { 50 } else { 5 };
        thread::sleep(Duration::from_millis(sleep_ms));
        self.drain();
        Ok(())
    }

    /// Drain pending input reports so a stale response doesn't corrupt the
    /// next read. Short timeouts only — this must never block the caller.
    fn drain(&self) {
        let mut buf = [0u8; 64];
        while matches!(self.device.read_timeout(&mut buf, 2), Ok(n) if n > 0) {}
    }

    /// Feature-report handshake first; if that path errors or reports a
    /// non-success status, fall back to a data-frame handshake carrying the
    /// magic in the body. The fallback path has no status byte to check
    /// (§9): success is assumed once the write itself doesn't error.
    pub fn handshake(&mut self) -> Result<()> {
        match self.send_command(CMD_HANDSHAKE, HANDSHAKE_MAGIC) {
            Ok(resp) if resp.is_success() => {
                debug!("handshake succeeded via feature report");
                return Ok(());
            }
            Ok(resp) => warn!("handshake feature-report status {:#04x}, falling back", resp.status),
            Err(e) => warn!("handshake feature-report failed: {e:#}, falling back to data frame"),
        }

        let payload = HANDSHAKE_MAGIC.to_le_bytes();
        let (report_id, capacity) = pick_report_id(7 + payload.len())?;
        self.send_data(report_id, capacity, CMD_HANDSHAKE, 0, &payload, false)
            .context("data-frame handshake fallback failed")
    }

    /// No-op if `idx` is already active; never issues a reload, which would
    /// discard RAM-only actuation/rapid-trigger writes.
    pub fn activate_profile(&mut self, idx: u8) -> Result<()> {
        if self.active_profile == Some(idx) {
            return Ok(());
        }
        let resp = self.send_command(CMD_ACTIVATE_PROFILE, idx as u32)?;
        if !resp.is_success() {
            return Err(TransportError::Status(resp.status).into());
        }
        self.active_profile = Some(idx);
        Ok(())
    }

    pub fn write_actuation(&self, profile: u8, keys: &[KeySetting], save: bool) -> Result<()> {
        self.write_keys(CMD_ACTUATION, profile, keys, save)
    }

    pub fn write_rapid_trigger(&self, profile: u8, keys: &[KeySetting], save: bool) -> Result<()> {
        self.write_keys(CMD_RAPID_TRIGGER, profile, keys, save)
    }

    fn write_keys(&self, cmd: u8, profile: u8, keys: &[KeySetting], save: bool) -> Result<()> {
        let body = build_partial_key_map(keys);
        let options = (save as u8) | ((profile & 0x03) << 1);
        let (report_id, capacity) = pick_report_id(7 + body.len())?;
        self.send_data(report_id, capacity, cmd, options, &body, save)
            .with_context(|| format!("write (cmd {cmd}) failed"))
    }

    /// Sparingly: flash wear. Blocks ~200ms so the caller doesn't immediately
    /// issue another write into a busy flash cycle.
    pub fn save_to_flash(&self) -> Result<()> {
        let resp = self.send_command(CMD_SAVE_PROFILE, 0)?;
        if !resp.is_success() {
            warn!("save_to_flash status {:#04x}", resp.status);
        }
        thread::sleep(Duration::from_millis(200));
        Ok(())
    }

    fn read_keys(&self, cmd: u8, profile: u8) -> Result<Vec<u8>> {
        let resp = self.send_command(cmd, profile as u32)?;
        if !resp.is_success() {
            return Err(TransportError::Status(resp.status).into());
        }
        if !resp.body.is_empty() {
            return Ok(resp.body);
        }

        let mut buf = [0u8; 64];
        let n = self
            .device
            .read_timeout(&mut buf, 500)
            .context("reading body report")?;
        Ok(parse_response(&buf[..n])?.body)
    }

    pub fn read_actuation(&self, profile: u8) -> Result<Vec<u8>> {
        self.read_keys(CMD_GET_ACTUATION, profile)
    }

    pub fn read_rapid_trigger(&self, profile: u8) -> Result<Vec<u8>> {
        self.read_keys(CMD_GET_RT, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_report_id_smallest_fit() {
        assert_eq!(pick_report_id(1).unwrap(), (1, 32));
        assert_eq!(pick_report_id(32).unwrap(), (1, 32));
        assert_eq!(pick_report_id(33).unwrap(), (2, 62));
        assert_eq!(pick_report_id(254).unwrap(), (3, 254));
        assert_eq!(pick_report_id(2046).unwrap(), (6, 2046));
    }

    #[test]
    fn pick_report_id_too_large() {
        assert!(matches!(
            pick_report_id(2047),
            Err(TransportError::PayloadTooLarge(2047))
        ));
    }

    #[test]
    fn parse_response_success() {
        let buf = [0xD1, 0xDA, 21, 0x88, 0x02, 0x00, 0xAA, 0xBB];
        let resp = parse_response(&buf).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.cmd_echo, 21);
        assert_eq!(resp.body, vec![0xAA, 0xBB]);
    }

    #[test]
    fn parse_response_bad_magic() {
        let buf = [0x00, 0x00, 21, 0x88, 0x00, 0x00];
        assert!(matches!(parse_response(&buf), Err(TransportError::BadMagic(_, _))));
    }

    #[test]
    fn parse_response_too_short() {
        let buf = [0xD1, 0xDA, 21, 0x88];
        assert!(matches!(parse_response(&buf), Err(TransportError::ShortResponse(4))));
    }

    #[test]
    fn parse_response_truncated_body_is_clamped() {
        // body_len claims 10 bytes but only 2 are actually present.
        let buf = [0xD1, 0xDA, 21, 0x88, 0x0A, 0x00, 0x01, 0x02];
        let resp = parse_response(&buf).unwrap();
        assert_eq!(resp.body, vec![0x01, 0x02]);
    }

    #[test]
    fn build_command_frame_layout() {
        let frame = build_command_frame(CMD_HANDSHAKE, HANDSHAKE_MAGIC);
        assert_eq!(frame[0], 0x01);
        assert_eq!(&frame[1..3], &MAGIC);
        assert_eq!(frame[3], CMD_HANDSHAKE);
        assert_eq!(u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]), HANDSHAKE_MAGIC);
        assert_eq!(frame.len(), 9);
    }

    #[test]
    fn build_data_frame_matches_spec_example() {
        // row=3, col=3, mm=0.4 -> body [0x12, 0x03, 0x08, 0xE3, 0x34]
        let body = [0x12, 0x03, 0x08, 0xE3, 0x34];
        let (report_id, capacity) = pick_report_id(7 + body.len()).unwrap();
        assert_eq!((report_id, capacity), (1, 32));

        let frame = build_data_frame(report_id, capacity, CMD_ACTUATION, 0, &body);
        let mut expected = vec![1, 0xD1, 0xDA, 21, 0, 0x05, 0x00, 0x12, 0x03, 0x08, 0xE3, 0x34];
        expected.resize(33, 0);
        assert_eq!(frame, expected);
    }

    #[test]
    fn options_byte_encodes_save_and_profile() {
        let save = true;
        let profile: u8 = 2;
        let options = (save as u8) | ((profile & 0x03) << 1);
        assert_eq!(options, 0b0101);
    }
}
