//! Frame codec for the transceiver's binary protocol
//!
//! Frames are delimited only by their command byte, a length field and a
//! trailing stop marker. The codec accumulates raw bytes from the link and
//! hands out one validated frame at a time, resynchronising on the next
//! command byte whenever a candidate frame fails validation.

use crate::core::constants::{
    DISTANCE_FRAME_SIZE, DISTANCE_LEN_FIELD, FRAME_HEADER_SIZE, GRID_FRAME_SIZE, GRID_LEN_FIELD,
    MAX_ANCHORS, SHORT_MAC_LEN, STOP_BYTE, UWB_CMD,
};
use crate::core::types::{
    DistanceFrame, GpsPosition, GridFrame, LocalPosition, MacAddress, MacMode, RangeMeasurement,
};
use log::{debug, trace};
use thiserror::Error;

/// Reasons a candidate frame is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("Unexpected command byte 0x{0:02X}")]
    BadCommand(u8),
    #[error("Unknown length field 0x{0:04X}")]
    BadLength(u16),
    #[error("Bad stop marker: expected 0x{expected:02X}, found 0x{found:02X}")]
    BadStop { expected: u8, found: u8 },
    #[error("Frame needs {required} bytes, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("Anchor count {0} exceeds the maximum")]
    TooManyAnchors(u8),
    #[error("Unknown MAC addressing mode {0}")]
    BadMacMode(u8),
    #[error("Incomplete candidate overtaken by a complete frame")]
    Superseded,
}

/// A decoded device frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Distance(DistanceFrame),
    Grid(Box<GridFrame>),
}

/// Little-endian cursor over a frame body
struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn u8(&mut self) -> u8 {
        let value = self.data[self.offset];
        self.offset += 1;
        value
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.bytes())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.bytes())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.bytes())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.bytes())
    }

    fn local_position(&mut self) -> LocalPosition {
        LocalPosition {
            x: self.i16(),
            y: self.i16(),
            z: self.i16(),
        }
    }
}

/// Frame size implied by a length field, if it names a known frame kind
fn frame_size_for(len_field: u16) -> Option<usize> {
    match len_field {
        DISTANCE_LEN_FIELD => Some(DISTANCE_FRAME_SIZE),
        GRID_LEN_FIELD => Some(GRID_FRAME_SIZE),
        _ => None,
    }
}

fn check_header(data: &[u8], len_field: u16, size: usize) -> Result<(), FrameError> {
    if data.len() < size {
        return Err(FrameError::InsufficientData {
            required: size,
            available: data.len(),
        });
    }
    if data[0] != UWB_CMD {
        return Err(FrameError::BadCommand(data[0]));
    }
    let declared = u16::from_le_bytes([data[1], data[2]]);
    if declared != len_field {
        return Err(FrameError::BadLength(declared));
    }
    let stop = data[size - 1];
    if stop != STOP_BYTE {
        return Err(FrameError::BadStop {
            expected: STOP_BYTE,
            found: stop,
        });
    }
    Ok(())
}

/// Decode a distance-result frame from exactly its wire bytes
pub fn decode_distance(data: &[u8]) -> Result<DistanceFrame, FrameError> {
    check_header(data, DISTANCE_LEN_FIELD, DISTANCE_FRAME_SIZE)?;

    let mut reader = ByteReader::new(&data[FRAME_HEADER_SIZE..DISTANCE_FRAME_SIZE - 1]);
    let seq_ctr = reader.u32();
    let session_id = reader.u32();
    let range_interval = reader.u32();
    let mac = MacAddress(reader.bytes());

    let measurement = RangeMeasurement {
        mac: MacAddress(reader.bytes()),
        status: reader.u8(),
        distance_cm: reader.u16(),
        nlos: reader.u8(),
        aoa_azimuth: reader.i16(),
        aoa_elevation: reader.i16(),
        aoa_dest_azimuth: reader.i16(),
        aoa_dest_elevation: reader.i16(),
        aoa_azimuth_fom: reader.u8(),
        aoa_elevation_fom: reader.u8(),
        aoa_dest_azimuth_fom: reader.u8(),
        aoa_dest_elevation_fom: reader.u8(),
    };

    Ok(DistanceFrame {
        seq_ctr,
        session_id,
        range_interval,
        mac,
        measurement,
    })
}

/// Encode a distance-result frame into its 36 wire bytes
pub fn encode_distance(frame: &DistanceFrame) -> Vec<u8> {
    let m = &frame.measurement;
    let mut out = Vec::with_capacity(DISTANCE_FRAME_SIZE);
    out.push(UWB_CMD);
    out.extend_from_slice(&DISTANCE_LEN_FIELD.to_le_bytes());
    out.extend_from_slice(&frame.seq_ctr.to_le_bytes());
    out.extend_from_slice(&frame.session_id.to_le_bytes());
    out.extend_from_slice(&frame.range_interval.to_le_bytes());
    out.extend_from_slice(&frame.mac.0);
    out.extend_from_slice(&m.mac.0);
    out.push(m.status);
    out.extend_from_slice(&m.distance_cm.to_le_bytes());
    out.push(m.nlos);
    for aoa in [m.aoa_azimuth, m.aoa_elevation, m.aoa_dest_azimuth, m.aoa_dest_elevation] {
        out.extend_from_slice(&aoa.to_le_bytes());
    }
    out.extend_from_slice(&[
        m.aoa_azimuth_fom,
        m.aoa_elevation_fom,
        m.aoa_dest_azimuth_fom,
        m.aoa_dest_elevation_fom,
    ]);
    out.push(STOP_BYTE);
    out
}

/// Decode a grid-configuration frame from exactly its wire bytes
pub fn decode_grid(data: &[u8]) -> Result<GridFrame, FrameError> {
    check_header(data, GRID_LEN_FIELD, GRID_FRAME_SIZE)?;

    let mut reader = ByteReader::new(&data[FRAME_HEADER_SIZE..GRID_FRAME_SIZE - 1]);
    let initiator_time = reader.u32();
    let session_id = reader.u32();

    let num_anchors = reader.u8();
    if num_anchors as usize > MAX_ANCHORS {
        return Err(FrameError::TooManyAnchors(num_anchors));
    }

    let target_gps = GpsPosition {
        lat: reader.f32(),
        lon: reader.f32(),
        alt: reader.f32(),
        yaw: reader.f32(),
    };

    let mode_byte = reader.u8();
    let mac_mode = MacMode::from_wire(mode_byte).ok_or(FrameError::BadMacMode(mode_byte))?;

    // MAC table is stored byte-major: all first bytes, then all second bytes
    let table: [u8; SHORT_MAC_LEN * MAX_ANCHORS] = reader.bytes();
    let mut anchor_macs = [MacAddress::default(); MAX_ANCHORS];
    for (i, mac) in anchor_macs.iter_mut().enumerate() {
        *mac = MacAddress([table[i], table[MAX_ANCHORS + i]]);
    }

    let target_pos = reader.local_position();
    let mut anchor_pos = [LocalPosition::default(); MAX_ANCHORS];
    for pos in anchor_pos.iter_mut() {
        *pos = reader.local_position();
    }

    Ok(GridFrame {
        initiator_time,
        session_id,
        num_anchors,
        target_gps,
        mac_mode,
        anchor_macs,
        target_pos,
        anchor_pos,
    })
}

/// Encode a grid-configuration frame into its 132 wire bytes
pub fn encode_grid(frame: &GridFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(GRID_FRAME_SIZE);
    out.push(UWB_CMD);
    out.extend_from_slice(&GRID_LEN_FIELD.to_le_bytes());
    out.extend_from_slice(&frame.initiator_time.to_le_bytes());
    out.extend_from_slice(&frame.session_id.to_le_bytes());
    out.push(frame.num_anchors);
    let gps = &frame.target_gps;
    for value in [gps.lat, gps.lon, gps.alt, gps.yaw] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.push(frame.mac_mode.to_wire());
    for byte in 0..SHORT_MAC_LEN {
        out.extend(frame.anchor_macs.iter().map(|mac| mac.0[byte]));
    }
    for pos in std::iter::once(&frame.target_pos).chain(frame.anchor_pos.iter()) {
        out.extend_from_slice(&pos.x.to_le_bytes());
        out.extend_from_slice(&pos.y.to_le_bytes());
        out.extend_from_slice(&pos.z.to_le_bytes());
    }
    out.push(STOP_BYTE);
    out
}

/// Accumulates link bytes and extracts validated frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
    frames_decoded: u64,
    frames_rejected: u64,
    bytes_skipped: u64,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(2 * GRID_FRAME_SIZE),
            ..Default::default()
        }
    }

    /// Append bytes as they arrive from the link
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting in the accumulation buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    pub fn bytes_skipped(&self) -> u64 {
        self.bytes_skipped
    }

    /// Drop all buffered bytes, e.g. after a link reset
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to extract one frame.
    ///
    /// Returns `None` when more bytes are needed, `Some(Err(_))` when a
    /// candidate was rejected (the codec has already resynchronised and the
    /// caller should simply call again), and `Some(Ok(frame))` on success.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        self.skip_to_command();

        if self.buffer.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let len_field = u16::from_le_bytes([self.buffer[1], self.buffer[2]]);
        let size = match frame_size_for(len_field) {
            Some(size) => size,
            None => {
                self.reject(FrameError::BadLength(len_field));
                return Some(Err(FrameError::BadLength(len_field)));
            }
        };

        if self.buffer.len() < size {
            if self.complete_frame_ahead() {
                let error = FrameError::Superseded;
                self.reject(error.clone());
                return Some(Err(error));
            }
            return None;
        }

        let result = match len_field {
            DISTANCE_LEN_FIELD => decode_distance(&self.buffer[..size]).map(Frame::Distance),
            _ => decode_grid(&self.buffer[..size]).map(|grid| Frame::Grid(Box::new(grid))),
        };

        match result {
            Ok(frame) => {
                self.buffer.drain(..size);
                self.frames_decoded += 1;
                trace!("Decoded {} byte frame", size);
                Some(Ok(frame))
            }
            Err(error) => {
                self.reject(error.clone());
                Some(Err(error))
            }
        }
    }

    /// Discard leading bytes that cannot start a frame
    fn skip_to_command(&mut self) {
        let start = self
            .buffer
            .iter()
            .position(|&b| b == UWB_CMD)
            .unwrap_or(self.buffer.len());
        if start > 0 {
            self.buffer.drain(..start);
            self.bytes_skipped += start as u64;
        }
    }

    /// True if a complete, valid distance frame starts after the head.
    ///
    /// An incomplete grid candidate whose length field was corrupted would
    /// otherwise hold back every frame behind it until enough bytes arrive.
    fn complete_frame_ahead(&self) -> bool {
        (1..self.buffer.len())
            .filter(|&i| self.buffer[i] == UWB_CMD)
            .take_while(|&i| i + DISTANCE_FRAME_SIZE <= self.buffer.len())
            .any(|i| decode_distance(&self.buffer[i..i + DISTANCE_FRAME_SIZE]).is_ok())
    }

    /// Give up on the candidate at the head of the buffer.
    ///
    /// Only the candidate's command byte is consumed; the scan for the next
    /// command byte happens on the following call so bytes of a frame that
    /// starts inside the rejected candidate are never lost.
    fn reject(&mut self, error: FrameError) {
        debug!("Rejected frame candidate: {}", error);
        self.buffer.drain(..1);
        self.frames_rejected += 1;
        self.bytes_skipped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_distance(seq: u32) -> DistanceFrame {
        DistanceFrame {
            seq_ctr: seq,
            session_id: 0x0102_0304,
            range_interval: 200,
            mac: MacAddress::from_u16(0xAAAA),
            measurement: RangeMeasurement {
                mac: MacAddress::from_u16(0x1001),
                status: 0,
                distance_cm: 150,
                nlos: 0,
                aoa_azimuth: -640,
                aoa_elevation: 256,
                aoa_dest_azimuth: 12,
                aoa_dest_elevation: -12,
                aoa_azimuth_fom: 90,
                aoa_elevation_fom: 85,
                aoa_dest_azimuth_fom: 70,
                aoa_dest_elevation_fom: 65,
            },
        }
    }

    fn sample_grid() -> GridFrame {
        let mut grid = GridFrame {
            initiator_time: 42,
            session_id: 7,
            num_anchors: 2,
            target_gps: GpsPosition {
                lat: 51.5,
                lon: -0.12,
                alt: 30.0,
                yaw: 90.0,
            },
            mac_mode: MacMode::Short,
            target_pos: LocalPosition::new(0, 0, -50),
            ..Default::default()
        };
        grid.anchor_macs[0] = MacAddress::from_u16(0x1001);
        grid.anchor_macs[1] = MacAddress::from_u16(0x1002);
        grid.anchor_pos[0] = LocalPosition::new(100, 0, 0);
        grid.anchor_pos[1] = LocalPosition::new(-100, 0, 0);
        grid
    }

    fn drain(codec: &mut FrameCodec) -> (Vec<Frame>, usize) {
        let mut frames = Vec::new();
        let mut errors = 0;
        while let Some(result) = codec.next_frame() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(_) => errors += 1,
            }
        }
        (frames, errors)
    }

    #[test]
    fn test_distance_frame_layout() {
        let bytes = encode_distance(&sample_distance(1));
        assert_eq!(bytes.len(), DISTANCE_FRAME_SIZE);
        assert_eq!(bytes[0], 0x8E);
        assert_eq!(&bytes[1..3], &[0x30, 0x00]);
        assert_eq!(bytes[35], 0x1B);
        // distance field, little-endian centimeters
        assert_eq!(&bytes[20..22], &150u16.to_le_bytes());
    }

    #[test]
    fn test_distance_frame_decode() {
        let source = sample_distance(9);
        let decoded = decode_distance(&encode_distance(&source)).unwrap();
        assert_eq!(decoded, source);
        assert_eq!(decoded.measurement.azimuth_deg(), 5.0);
        assert_eq!(decoded.measurement.elevation_deg(), -2.0);
    }

    #[test]
    fn test_grid_frame_decode() {
        let source = sample_grid();
        let bytes = encode_grid(&source);
        assert_eq!(bytes.len(), GRID_FRAME_SIZE);
        assert_eq!(bytes[GRID_FRAME_SIZE - 1], 27);

        let decoded = decode_grid(&bytes).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn test_grid_rejects_too_many_anchors() {
        let mut bytes = encode_grid(&sample_grid());
        bytes[11] = 13; // num_anchors
        assert_eq!(decode_grid(&bytes), Err(FrameError::TooManyAnchors(13)));
    }

    #[test]
    fn test_byte_by_byte_feed_yields_one_frame() {
        let source = sample_distance(3);
        let bytes = encode_distance(&source);
        let mut codec = FrameCodec::new();

        let mut frames = Vec::new();
        for byte in &bytes {
            codec.push(std::slice::from_ref(byte));
            let (mut got, errors) = drain(&mut codec);
            assert_eq!(errors, 0);
            frames.append(&mut got);
        }

        assert_eq!(frames, vec![Frame::Distance(source)]);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_arbitrary_chunk_sizes() {
        let frames_in: Vec<DistanceFrame> = (0..5).map(sample_distance).collect();
        let mut stream = Vec::new();
        for frame in &frames_in {
            stream.extend(encode_distance(frame));
        }
        stream.extend(encode_grid(&sample_grid()));

        for chunk in [1usize, 2, 5, 7, 13, 36, 64, 500] {
            let mut codec = FrameCodec::new();
            let mut out = Vec::new();
            for piece in stream.chunks(chunk) {
                codec.push(piece);
                out.extend(drain(&mut codec).0);
            }
            assert_eq!(out.len(), 6, "chunk size {}", chunk);
            for (frame, expected) in out.iter().zip(&frames_in) {
                assert_eq!(frame, &Frame::Distance(*expected));
            }
            assert_eq!(out[5], Frame::Grid(Box::new(sample_grid())));
        }
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let mut codec = FrameCodec::new();
        codec.push(&[0x00, 0x13, 0x37]);
        codec.push(&encode_distance(&sample_distance(1)));
        let (frames, errors) = drain(&mut codec);
        assert_eq!(frames.len(), 1);
        assert_eq!(errors, 0);
        assert_eq!(codec.bytes_skipped(), 3);
    }

    #[test]
    fn test_corrupted_framing_bytes_resync_on_next_frame() {
        let good = sample_distance(2);
        let next = sample_distance(3);

        // command byte, both length bytes and the stop marker
        for index in [0usize, 1, 2, DISTANCE_FRAME_SIZE - 1] {
            let mut corrupted = encode_distance(&good);
            corrupted[index] ^= 0x55;

            let mut codec = FrameCodec::new();
            codec.push(&corrupted);
            codec.push(&encode_distance(&next));

            let (frames, errors) = drain(&mut codec);
            assert_eq!(frames, vec![Frame::Distance(next)], "corrupted byte {}", index);
            if index != 0 {
                assert!(errors >= 1, "corrupted byte {}", index);
            }
            assert_eq!(codec.buffered(), 0);
        }
    }

    #[test]
    fn test_length_corrupted_to_grid_does_not_stall_next_frame() {
        let next = sample_distance(3);
        let mut corrupted = encode_distance(&sample_distance(2));
        corrupted[1] = 0x84;

        let mut codec = FrameCodec::new();
        codec.push(&corrupted);
        assert!(codec.next_frame().is_none());
        codec.push(&encode_distance(&next));

        let (frames, errors) = drain(&mut codec);
        assert_eq!(frames, vec![Frame::Distance(next)]);
        assert!(errors >= 1);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_grid_split_across_pushes_still_decodes() {
        let bytes = encode_grid(&sample_grid());
        let mut codec = FrameCodec::new();
        codec.push(&bytes[..70]);
        assert!(codec.next_frame().is_none());
        codec.push(&bytes[70..]);
        let (frames, errors) = drain(&mut codec);
        assert_eq!(errors, 0);
        assert_eq!(frames, vec![Frame::Grid(Box::new(sample_grid()))]);
    }

    #[test]
    fn test_truncated_frame_does_not_swallow_next_frame() {
        let next = sample_distance(11);
        let truncated = &encode_distance(&sample_distance(10))[..20];

        let mut codec = FrameCodec::new();
        codec.push(truncated);
        assert!(codec.next_frame().is_none());
        codec.push(&encode_distance(&next));

        let (frames, errors) = drain(&mut codec);
        assert!(errors >= 1);
        assert_eq!(frames.last(), Some(&Frame::Distance(next)));
    }

    #[test]
    fn test_unknown_length_rejected_immediately() {
        let mut codec = FrameCodec::new();
        codec.push(&[UWB_CMD, 0x05, 0x04]);
        assert_eq!(codec.next_frame(), Some(Err(FrameError::BadLength(0x0405))));
        assert!(codec.next_frame().is_none());
        assert_eq!(codec.frames_rejected(), 1);
    }
}
