/* Counter-strafe statistics: appends one CSV row per counter-strafe exit
 * when enabled. Columns: timestamp, axis, direction, counter_strafe_ms,
 * weapon. */
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsAxis {
    Horizontal,
    Vertical,
}

impl StatsAxis {
    fn label(self) -> &'static str {
        match self {
            StatsAxis::Horizontal => "H",
            StatsAxis::Vertical => "V",
        }
    }
}

/// The key that was just pressed to complete a counter-strafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    W,
    A,
    S,
    D,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::W => "W",
            Direction::A => "A",
            Direction::S => "S",
            Direction::D => "D",
        }
    }
}

pub struct StatsLog {
    file: Option<File>,
}

impl StatsLog {
    /// Opens (creating if needed) the CSV file and writes the header row if
    /// it's new. `enabled = false` yields a no-op logger so call sites don't
    /// need to branch on the config flag themselves.
    pub fn open(path: &Path, enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self { file: None });
        }

        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open stats log {}", path.display()))?;
        if is_new {
            writeln!(file, "timestamp,axis,direction,counter_strafe_ms,weapon")?;
        }
        Ok(Self { file: Some(file) })
    }

    pub fn log_counter_strafe(&mut self, axis: StatsAxis, direction: Direction, counter_strafe_ms: u64, weapon: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(
            file,
            "{timestamp},{},{},{counter_strafe_ms},{weapon}",
            axis.label(),
            direction.label(),
        );
    }
}
