//! Byte stream processing

pub mod parser;

pub use parser::{Frame, FrameCodec, FrameError};
