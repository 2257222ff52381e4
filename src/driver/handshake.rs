//! Session command sequences

use crate::core::constants::*;
use crate::core::types::DriverMode;
use crate::hardware::{CommResult, TransceiverInterface};
use log::trace;

/// One 5-byte command frame
pub type Command = [u8; 5];

pub const fn command(target: u8, opcode: u8) -> Command {
    [UWB_CMD, UWB_CMD_LEN, target, opcode, STOP_BYTE]
}

pub const APP_START: Command = command(UWB_PRECNAV_APP, UWB_APP_START);
pub const APP_STOP: Command = command(UWB_PRECNAV_APP, UWB_APP_STOP);
pub const SESSION_START: Command = command(UWB_PRECNAV_APP, UWB_SESSION_START);
pub const SESSION_STOP: Command = command(UWB_PRECNAV_APP, UWB_SESSION_STOP);
pub const RANGING_START: Command = command(UWB_PRECNAV_APP, UWB_RANGING_START);
pub const RANGING_STOP: Command = command(UWB_PRECNAV_APP, UWB_RANGING_STOP);

/// Device-side application profile for a guidance mode
pub fn profile(mode: DriverMode) -> Option<Command> {
    match mode {
        DriverMode::Data => None,
        DriverMode::PrecisionNavigation => Some(command(UWB_DRONE_CTL, UWB_SUBCMD_PRECLAND)),
        DriverMode::FollowMe => Some(command(UWB_DRONE_CTL, UWB_SUBCMD_FOLLOW_ME)),
    }
}

/// Commands that open a ranging session in `mode`
pub fn start_sequence(mode: DriverMode) -> Vec<Command> {
    let mut sequence = vec![APP_START, SESSION_START];
    sequence.extend(profile(mode));
    sequence.push(RANGING_START);
    sequence
}

/// Commands that close a ranging session
pub fn stop_sequence() -> Vec<Command> {
    vec![RANGING_STOP, SESSION_STOP, APP_STOP]
}

/// Write a sequence, stopping at the first failed write
pub fn send_sequence<T: TransceiverInterface + ?Sized>(link: &mut T, sequence: &[Command]) -> CommResult<()> {
    for cmd in sequence {
        trace!("-> {:02X?}", cmd);
        link.send_message(cmd)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockTransceiver;

    #[test]
    fn test_command_bytes() {
        assert_eq!(APP_START, [0x8E, 0x05, 0x04, 0x10, 0x1B]);
        assert_eq!(SESSION_STOP, [0x8E, 0x05, 0x04, 0x23, 0x1B]);
        assert_eq!(RANGING_STOP, [0x8E, 0x05, 0x04, 0x00, 0x1B]);
        assert_eq!(
            profile(DriverMode::FollowMe),
            Some([0x8E, 0x05, 0x0A, 0x0F, 0x1B])
        );
    }

    #[test]
    fn test_sequences() {
        assert_eq!(
            start_sequence(DriverMode::PrecisionNavigation),
            vec![APP_START, SESSION_START, command(0x0A, 0x0B), RANGING_START]
        );
        assert_eq!(start_sequence(DriverMode::Data).len(), 3);
        assert_eq!(stop_sequence(), vec![RANGING_STOP, SESSION_STOP, APP_STOP]);
    }

    #[test]
    fn test_send_stops_at_failure() {
        let mut link = MockTransceiver::new();
        link.short_next_writes(1);
        assert!(send_sequence(&mut link, &stop_sequence()).is_err());
        assert!(link.get_sent_messages().is_empty());

        send_sequence(&mut link, &stop_sequence()).unwrap();
        assert_eq!(link.get_sent_messages().len(), 3);
    }
}
