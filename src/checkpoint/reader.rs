//! Checkpoint reader for restarting a rank.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::format::{
    CheckpointHeader, CompressionType, FrameIndex, decode_values, decompress_lz4,
};
use super::{Snapshot, SnapshotSource};
use crate::compute::{LocalSubdomain, Result};

/// Reads snapshots back from a checkpoint file.
///
/// Usage:
/// ```ignore
/// let mut reader = CheckpointReader::open("out.0000.gsck")?;
/// let snapshot = reader.read_step(200)?;
/// sim.resume(snapshot.step, &snapshot.u, &snapshot.v)?;
/// ```
pub struct CheckpointReader {
    reader: BufReader<File>,
    header: CheckpointHeader,
    frame_indices: Vec<FrameIndex>,
}

impl CheckpointReader {
    /// Open a checkpoint file.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let header = CheckpointHeader::read_from(&mut reader)?;

        // Seek to end to find index table
        let table_size = header.frame_count * FrameIndex::SIZE as u64;
        let file_len = reader.seek(SeekFrom::End(0))?;
        let index_start = file_len
            .checked_sub(table_size)
            .filter(|&start| start >= CheckpointHeader::SIZE as u64)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "Truncated GSCK frame index")
            })?;

        reader.seek(SeekFrom::Start(index_start))?;

        let mut frame_indices = Vec::with_capacity(header.frame_count as usize);
        for _ in 0..header.frame_count {
            frame_indices.push(FrameIndex::read_from(&mut reader)?);
        }

        Ok(Self {
            reader,
            header,
            frame_indices,
        })
    }

    pub fn header(&self) -> &CheckpointHeader {
        &self.header
    }

    /// Total number of frames.
    pub fn frame_count(&self) -> u64 {
        self.header.frame_count
    }

    /// Step indices of all frames, in file order.
    pub fn steps(&self) -> impl Iterator<Item = u64> + '_ {
        self.frame_indices.iter().map(|i| i.step)
    }

    /// Subdomain recorded in the header.
    pub fn local(&self) -> LocalSubdomain {
        LocalSubdomain {
            size: self.header.local.map(|n| n as usize),
            offset: self.header.offset.map(|n| n as usize),
        }
    }

    /// Read the frame at position `frame` in the file.
    pub fn read_frame(&mut self, frame: usize) -> io::Result<Snapshot> {
        let index = *self.frame_indices.get(frame).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Frame {} out of range ({} frames)",
                    frame,
                    self.frame_indices.len()
                ),
            )
        })?;

        self.reader.seek(SeekFrom::Start(index.offset))?;
        let mut data = vec![0u8; index.size as usize];
        self.reader.read_exact(&mut data)?;

        let raw = match self.header.compression {
            CompressionType::None => data,
            CompressionType::Lz4 => decompress_lz4(&data)?,
        };

        let cells = self.header.local_cells();
        if raw.len() != cells * 16 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame holds {} bytes, expected {}", raw.len(), cells * 16),
            ));
        }
        let (u_bytes, v_bytes) = raw.split_at(cells * 8);
        let mut u = vec![0.0; cells];
        let mut v = vec![0.0; cells];
        decode_values(u_bytes, &mut u)?;
        decode_values(v_bytes, &mut v)?;

        Ok(Snapshot {
            step: index.step,
            global: self.header.global.map(|n| n as usize),
            local: self.local(),
            u,
            v,
        })
    }

    /// Read the frame recorded at `step`.
    pub fn read_step(&mut self, step: u64) -> io::Result<Snapshot> {
        let frame = self
            .frame_indices
            .iter()
            .rposition(|i| i.step == step)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No frame for step {}", step),
                )
            })?;
        self.read_frame(frame)
    }

    /// Read the last frame in the file.
    pub fn latest(&mut self) -> io::Result<Snapshot> {
        match self.frame_indices.len() {
            0 => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "Checkpoint has no frames",
            )),
            n => self.read_frame(n - 1),
        }
    }
}

impl SnapshotSource for CheckpointReader {
    fn read(&mut self, step: u64) -> Result<Snapshot> {
        Ok(self.read_step(step)?)
    }
}
