//! Binary format definitions for Gray-Scott checkpoint files.

use std::io::{self, Read, Write};

/// Magic bytes identifying a Gray-Scott checkpoint file.
pub const CHECKPOINT_MAGIC: &[u8; 4] = b"GSCK";

/// Current format version.
pub const CHECKPOINT_VERSION: u16 = 1;

/// Compression type for frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression (raw f64 data).
    #[default]
    None = 0,
    /// LZ4 fast compression.
    Lz4 = 1,
}

impl CompressionType {
    /// True if this build can encode and decode frames with this compression.
    pub fn is_available(self) -> bool {
        match self {
            CompressionType::None => true,
            CompressionType::Lz4 => cfg!(feature = "lz4"),
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl From<crate::schema::Compression> for CompressionType {
    fn from(c: crate::schema::Compression) -> Self {
        match c {
            crate::schema::Compression::None => CompressionType::None,
            crate::schema::Compression::Lz4 => CompressionType::Lz4,
        }
    }
}

/// Checkpoint file header flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointFlags {
    /// Compression type (lower 4 bits).
    pub compression: CompressionType,
}

impl CheckpointFlags {
    pub fn to_u16(self) -> u16 {
        self.compression as u16
    }

    pub fn from_u16(v: u16) -> io::Result<Self> {
        let compression = CompressionType::from_u8((v & 0x0F) as u8).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown compression type {}", v & 0x0F),
            )
        })?;
        Ok(Self { compression })
    }
}

/// File header of one rank's checkpoint file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointHeader {
    /// Global extent.
    pub global: [u32; 3],
    /// Local extent of the writing rank.
    pub local: [u32; 3],
    /// Global offset of the writing rank.
    pub offset: [u32; 3],
    /// Total number of frames.
    pub frame_count: u64,
    /// Simulation time step.
    pub dt: f64,
    /// Compression type.
    pub compression: CompressionType,
}

impl CheckpointHeader {
    /// Size of header in bytes.
    /// Magic(4) + Version(2) + Flags(2) + Global(12) + Local(12) + Offset(12) +
    /// FrameCount(8) + dt(8) + Reserved(16) = 76
    pub const SIZE: usize = 76;

    /// Number of cells per field.
    pub fn local_cells(&self) -> usize {
        self.local.iter().map(|&n| n as usize).product()
    }

    /// Size of one uncompressed frame payload (U and V) in bytes.
    pub fn frame_size(&self) -> usize {
        self.local_cells() * 2 * 8
    }

    /// Write header to output.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(CHECKPOINT_MAGIC)?;
        w.write_all(&CHECKPOINT_VERSION.to_le_bytes())?;
        let flags = CheckpointFlags {
            compression: self.compression,
        };
        w.write_all(&flags.to_u16().to_le_bytes())?;
        for triple in [&self.global, &self.local, &self.offset] {
            for v in triple {
                w.write_all(&v.to_le_bytes())?;
            }
        }
        w.write_all(&self.frame_count.to_le_bytes())?;
        w.write_all(&self.dt.to_le_bytes())?;
        // Reserved bytes
        w.write_all(&[0u8; 16])?;
        Ok(())
    }

    /// Read header from input.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != CHECKPOINT_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid GSCK magic bytes",
            ));
        }

        let mut buf2 = [0u8; 2];
        let mut buf4 = [0u8; 4];
        let mut buf8 = [0u8; 8];

        r.read_exact(&mut buf2)?;
        let version = u16::from_le_bytes(buf2);
        if version != CHECKPOINT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported GSCK version: {}", version),
            ));
        }

        r.read_exact(&mut buf2)?;
        let flags = CheckpointFlags::from_u16(u16::from_le_bytes(buf2))?;

        let mut triples = [[0u32; 3]; 3];
        for triple in &mut triples {
            for v in triple.iter_mut() {
                r.read_exact(&mut buf4)?;
                *v = u32::from_le_bytes(buf4);
            }
        }
        let [global, local, offset] = triples;

        r.read_exact(&mut buf8)?;
        let frame_count = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf8)?;
        let dt = f64::from_le_bytes(buf8);

        // Skip reserved bytes
        let mut reserved = [0u8; 16];
        r.read_exact(&mut reserved)?;

        Ok(Self {
            global,
            local,
            offset,
            frame_count,
            dt,
            compression: flags.compression,
        })
    }
}

/// Index entry for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndex {
    /// Step index stored in the frame.
    pub step: u64,
    /// Byte offset of the frame payload from start of file.
    pub offset: u64,
    /// Stored payload size in bytes.
    pub size: u64,
}

impl FrameIndex {
    /// Size of one index entry in bytes.
    pub const SIZE: usize = 24;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.step.to_le_bytes())?;
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.size.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];

        r.read_exact(&mut buf8)?;
        let step = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf8)?;
        let offset = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf8)?;
        let size = u64::from_le_bytes(buf8);

        Ok(Self { step, offset, size })
    }
}

/// Append f64 values to `out` as little-endian bytes.
pub fn encode_values(data: &[f64], out: &mut Vec<u8>) {
    out.reserve(data.len() * 8);
    for v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Decode little-endian bytes into `output`.
pub fn decode_values(bytes: &[u8], output: &mut [f64]) -> io::Result<()> {
    if bytes.len() != output.len() * 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame size mismatch: {} bytes vs {} doubles",
                bytes.len(),
                output.len()
            ),
        ));
    }
    for (v, b) in output.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf8 = [0u8; 8];
        buf8.copy_from_slice(b);
        *v = f64::from_le_bytes(buf8);
    }
    Ok(())
}

/// Compress data using LZ4.
#[cfg(feature = "lz4")]
pub fn compress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(data))
}

/// Decompress LZ4 data.
#[cfg(feature = "lz4")]
pub fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Without the `lz4` feature, LZ4 frames can be neither written nor read.
#[cfg(not(feature = "lz4"))]
pub fn compress_lz4(_data: &[u8]) -> io::Result<Vec<u8>> {
    Err(lz4_unavailable())
}

#[cfg(not(feature = "lz4"))]
pub fn decompress_lz4(_data: &[u8]) -> io::Result<Vec<u8>> {
    Err(lz4_unavailable())
}

#[cfg(not(feature = "lz4"))]
fn lz4_unavailable() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "LZ4 checkpoint frames require the `lz4` feature",
    )
}
