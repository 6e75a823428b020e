//! Stdout rendering. Logs go to stderr; this is the only place that
//! writes command results.

use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print `value` as JSON in machine mode, otherwise the lines from
    /// `human`.
    pub fn emit<T, F>(&self, value: &T, human: F) -> anyhow::Result<()>
    where
        T: Serialize,
        F: FnOnce() -> Vec<String>,
    {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            for line in human() {
                println!("{line}");
            }
        }
        Ok(())
    }

    /// Transient progress for humans; silent in JSON mode.
    pub fn note(&self, line: impl AsRef<str>) {
        if !self.json {
            eprintln!("{}", line.as_ref());
        }
    }
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MiB");
    }
}
