/* Process-presence polling for `--watch`: checks whether the target game is
 * running before (and while) the main loop is in adaptive mode. The
 * original tool walks a Win32 Toolhelp32 snapshot; this crate targets the
 * cross-platform `hidapi` surface, so presence is read from `/proc` on
 * Linux and assumed true elsewhere (documented in DESIGN.md). */
use std::time::Duration;

pub const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[cfg(target_os = "linux")]
pub fn is_process_running(name: &str) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return true;
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let comm_path = entry.path().join("comm");
        if let Ok(comm) = std::fs::read_to_string(comm_path) {
            if comm.trim() == name {
                return true;
            }
        }
    }
    false
}

#[cfg(not(target_os = "linux"))]
pub fn is_process_running(_name: &str) -> bool {
    true
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn current_process_comm_is_found() {
        let comm = std::fs::read_to_string("/proc/self/comm").unwrap();
        assert!(is_process_running(comm.trim()));
    }

    #[test]
    fn bogus_process_name_is_not_found() {
        assert!(!is_process_running("definitely-not-a-real-process-xyz"));
    }
}
