//! Pre-computed pitch-curve files (`FREQ0003` format).
//!
//! The curve stores one (F0, amplitude) pair per hop of `hop_size` samples,
//! little-endian, preceded by an eight byte magic, the hop size, the average
//! frequency and 16 reserved bytes.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 8] = b"FREQ0003";
const RESERVED_BYTES: usize = 16;

/// Error while reading pitch-curve bytes.
#[derive(Debug, thiserror::Error)]
pub enum FrqError {
    /// The buffer does not start with the `FREQ0003` magic.
    #[error("not a FREQ0003 pitch curve")]
    InvalidFormat,
    /// The buffer ended before the declared frame count was read.
    #[error("pitch curve data ended unexpectedly")]
    UnexpectedEof(#[from] std::io::Error),
    /// The declared frame count is negative.
    #[error("invalid pitch curve frame count: {0}")]
    InvalidFrameCount(i32),
}

/// One analysis hop of the curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrqFrame {
    pub f0: f64,
    pub amplitude: f64,
}

/// A parsed pitch-curve file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrqData {
    /// Hop spacing between frames, in samples.
    pub hop_size: i32,
    /// Average frequency over the voiced part of the sample.
    pub average_f0: f64,
    pub frames: Vec<FrqFrame>,
}

impl FrqData {
    pub fn parse(bytes: &[u8]) -> Result<Self, FrqError> {
        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FrqError::InvalidFormat);
        }
        let hop_size = cursor.read_i32::<LittleEndian>()?;
        let average_f0 = cursor.read_f64::<LittleEndian>()?;
        let mut reserved = [0u8; RESERVED_BYTES];
        cursor.read_exact(&mut reserved)?;
        let frame_count = cursor.read_i32::<LittleEndian>()?;
        if frame_count < 0 {
            return Err(FrqError::InvalidFrameCount(frame_count));
        }
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let f0 = cursor.read_f64::<LittleEndian>()?;
            let amplitude = cursor.read_f64::<LittleEndian>()?;
            frames.push(FrqFrame { f0, amplitude });
        }
        Ok(Self {
            hop_size,
            average_f0,
            frames,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 4 + 8 + RESERVED_BYTES + 4 + self.frames.len() * 16);
        // Writes into a Vec cannot fail.
        bytes.write_all(MAGIC).unwrap();
        bytes.write_i32::<LittleEndian>(self.hop_size).unwrap();
        bytes.write_f64::<LittleEndian>(self.average_f0).unwrap();
        bytes.write_all(&[0u8; RESERVED_BYTES]).unwrap();
        bytes
            .write_i32::<LittleEndian>(self.frames.len() as i32)
            .unwrap();
        for frame in &self.frames {
            bytes.write_f64::<LittleEndian>(frame.f0).unwrap();
            bytes.write_f64::<LittleEndian>(frame.amplitude).unwrap();
        }
        bytes
    }
}
