//! Grid configuration file loader
//!
//! The file is comma separated, one record per line:
//!
//! ```text
//! session,<session_id>,<initiator_time>
//! gps,<lat>,<lon>,<alt>,<yaw>
//! anchors,<count>,<mac_mode>
//! target,<x_cm>,<y_cm>,<z_cm>
//! anchor,<mac_hex>,<x_cm>,<y_cm>,<z_cm>
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use crate::core::constants::MAX_ANCHORS;
use crate::core::types::{GpsPosition, GridFrame, LocalPosition, MacAddress, MacMode};
use crate::utils::config::ConfigError;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Read and parse a grid file
pub fn load_grid_file<P: AsRef<Path>>(path: P) -> Result<GridFrame, ConfigError> {
    let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
        message: format!(
            "Failed to read grid file '{}': {}",
            path.as_ref().display(),
            e
        ),
    })?;
    parse_grid(&content)
}

/// Parse grid records from text
pub fn parse_grid(content: &str) -> Result<GridFrame, ConfigError> {
    let mut grid = GridFrame::default();
    let mut declared: Option<usize> = None;
    let mut seen_gps = false;
    let mut anchors = 0usize;

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let record = Record { line, fields: &fields };

        match fields[0] {
            "session" => {
                record.expect_len(3)?;
                grid.session_id = record.parse(1)?;
                grid.initiator_time = record.parse(2)?;
            }
            "gps" => {
                record.expect_len(5)?;
                grid.target_gps = GpsPosition {
                    lat: record.parse(1)?,
                    lon: record.parse(2)?,
                    alt: record.parse(3)?,
                    yaw: record.parse(4)?,
                };
                seen_gps = true;
            }
            "anchors" => {
                record.expect_len(3)?;
                let count: usize = record.parse(1)?;
                if count > MAX_ANCHORS {
                    return Err(record.invalid(format!(
                        "{} anchors declared, at most {} supported",
                        count, MAX_ANCHORS
                    )));
                }
                let mode: u8 = record.parse(2)?;
                grid.mac_mode = MacMode::from_wire(mode)
                    .ok_or_else(|| record.invalid(format!("unknown MAC mode {}", mode)))?;
                declared = Some(count);
            }
            "target" => {
                record.expect_len(4)?;
                grid.target_pos = record.position(1)?;
            }
            "anchor" => {
                record.expect_len(5)?;
                if anchors >= MAX_ANCHORS {
                    return Err(record.invalid("too many anchor rows".to_string()));
                }
                let mac = u16::from_str_radix(fields[1].trim_start_matches("0x"), 16)
                    .map_err(|_| record.invalid(format!("bad MAC '{}'", fields[1])))?;
                grid.anchor_macs[anchors] = MacAddress::from_u16(mac);
                grid.anchor_pos[anchors] = record.position(2)?;
                anchors += 1;
            }
            other => return Err(record.invalid(format!("unknown record '{}'", other))),
        }
    }

    let declared = declared.ok_or_else(|| ConfigError::MissingRecord {
        record: "anchors".to_string(),
    })?;
    if !seen_gps {
        return Err(ConfigError::MissingRecord {
            record: "gps".to_string(),
        });
    }
    if declared != anchors {
        return Err(ConfigError::AnchorCountMismatch {
            declared,
            found: anchors,
        });
    }

    grid.num_anchors = anchors as u8;
    Ok(grid)
}

struct Record<'a> {
    line: usize,
    fields: &'a [&'a str],
}

impl Record<'_> {
    fn invalid(&self, reason: String) -> ConfigError {
        ConfigError::InvalidRecord {
            line: self.line,
            reason,
        }
    }

    fn expect_len(&self, len: usize) -> Result<(), ConfigError> {
        if self.fields.len() != len {
            return Err(self.invalid(format!(
                "'{}' expects {} fields, found {}",
                self.fields[0],
                len,
                self.fields.len()
            )));
        }
        Ok(())
    }

    fn parse<T: FromStr>(&self, index: usize) -> Result<T, ConfigError> {
        self.fields[index]
            .parse()
            .map_err(|_| self.invalid(format!("cannot parse '{}'", self.fields[index])))
    }

    fn position(&self, start: usize) -> Result<LocalPosition, ConfigError> {
        Ok(LocalPosition {
            x: self.parse(start)?,
            y: self.parse(start + 1)?,
            z: self.parse(start + 2)?,
        })
    }
}
