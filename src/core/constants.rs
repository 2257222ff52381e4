//! Wire protocol constants and driver timing parameters

use std::time::Duration;

/// Command byte shared by all device frames and host commands
pub const UWB_CMD: u8 = 0x8E;

/// Terminating marker of every frame (decimal 27)
pub const STOP_BYTE: u8 = 0x1B;

/// Length field declared by distance-result frames
pub const DISTANCE_LEN_FIELD: u16 = 0x0030;

/// Total on-wire size of a distance-result frame
pub const DISTANCE_FRAME_SIZE: usize = 36;

/// Length field declared by grid-configuration frames
pub const GRID_LEN_FIELD: u16 = 0x0084;

/// Total on-wire size of a grid-configuration frame
pub const GRID_FRAME_SIZE: usize = 132;

/// Command byte plus the 16-bit length field
pub const FRAME_HEADER_SIZE: usize = 3;

/// Maximum number of anchors a grid can describe
pub const MAX_ANCHORS: usize = 12;

/// Bytes per short MAC address
pub const SHORT_MAC_LEN: usize = 2;

// Host command sequences
pub const UWB_CMD_LEN: u8 = 0x05;
pub const UWB_PRECNAV_APP: u8 = 0x04;
pub const UWB_APP_START: u8 = 0x10;
pub const UWB_APP_STOP: u8 = 0x11;
pub const UWB_SESSION_START: u8 = 0x22;
pub const UWB_SESSION_STOP: u8 = 0x23;
pub const UWB_RANGING_START: u8 = 0x01;
pub const UWB_RANGING_STOP: u8 = 0x00;
pub const UWB_DRONE_CTL: u8 = 0x0A;
pub const UWB_SUBCMD_PRECLAND: u8 = 0x0B;
pub const UWB_SUBCMD_FOLLOW_ME: u8 = 0x0F;

/// AoA fields are Q9.7 fixed point
pub const AOA_SCALE: f64 = 128.0;

/// Half-width of the antenna field of view used to normalise heading (degrees)
pub const AOA_FIELD_OF_VIEW_DEG: f64 = 70.0;

/// Default serial baud rate of the transceiver
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default location of the grid configuration file
pub const DEFAULT_GRID_CONFIG: &str = "/fs/microsd/etc/uwb_grid_config.csv";

/// Upper bound on a single descriptor wait
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Interval at which tunable parameters are re-read
pub const PARAM_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Age of the last position after which outputs derived from it go stale
pub const POSITION_STALE_TIMEOUT: Duration = Duration::from_millis(500);

/// Time constant of the follow-me decay once stale (seconds)
pub const FOLLOW_DECAY_TAU_S: f64 = 0.25;

/// Read windows without any byte before the module is reported silent
pub const SILENT_WINDOWS_BEFORE_WARNING: u32 = 10;
