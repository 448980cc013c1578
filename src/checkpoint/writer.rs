//! Checkpoint writer for one rank's snapshots.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::format::{CheckpointHeader, CompressionType, FrameIndex, compress_lz4, encode_values};
use super::{CheckpointReader, Snapshot, SnapshotSink};
use crate::compute::{LocalSubdomain, Result};

/// Per-rank checkpoint file name for `prefix`.
pub fn checkpoint_path(prefix: &str, rank: usize) -> PathBuf {
    PathBuf::from(format!("{}.{:04}.gsck", prefix, rank))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Writes snapshots of one rank to a checkpoint file.
///
/// The frame index and header are rewritten after every frame, so a run that
/// dies between outputs leaves a readable file holding every frame written so
/// far.
///
/// Usage:
/// ```ignore
/// let mut writer = CheckpointWriter::create("out.0000.gsck", extent, local, dt, CompressionType::None)?;
/// sim.run(&mut writer)?;
/// writer.finalize()?;
/// ```
pub struct CheckpointWriter {
    writer: BufWriter<File>,
    header: CheckpointHeader,
    frame_indices: Vec<FrameIndex>,
    /// End of the last frame; the index table starts here.
    data_end: u64,
    /// Staged file and its final name, for writers opened with [`Self::replace`].
    staged: Option<(PathBuf, PathBuf)>,
    /// Reused frame encoding buffer.
    encode_buffer: Vec<u8>,
}

impl CheckpointWriter {
    /// Create a checkpoint file for a rank owning `local`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        global: [usize; 3],
        local: LocalSubdomain,
        dt: f64,
        compression: CompressionType,
    ) -> io::Result<Self> {
        if !compression.is_available() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{:?} compression is not available in this build", compression),
            ));
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = CheckpointHeader {
            global: to_u32(global)?,
            local: to_u32(local.size)?,
            offset: to_u32(local.offset)?,
            frame_count: 0,
            dt,
            compression,
        };
        header.write_to(&mut writer)?;
        writer.flush()?;

        let frame_size = header.frame_size();

        Ok(Self {
            writer,
            header,
            frame_indices: Vec::new(),
            data_end: CheckpointHeader::SIZE as u64,
            staged: None,
            encode_buffer: Vec::with_capacity(frame_size),
        })
    }

    /// Write a replacement for `path` without touching it until [`Self::finalize`].
    ///
    /// Frames go to `<path>.partial`, which is renamed over `path` on finalize.
    /// If the run fails first, `path` is left as it was.
    pub fn replace<P: AsRef<Path>>(
        path: P,
        global: [usize; 3],
        local: LocalSubdomain,
        dt: f64,
        compression: CompressionType,
    ) -> io::Result<Self> {
        let target = path.as_ref().to_path_buf();
        let partial = partial_path(&target);
        let mut writer = Self::create(&partial, global, local, dt, compression)?;
        writer.staged = Some((partial, target));
        Ok(writer)
    }

    /// Append one snapshot.
    pub fn write_frame(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let local = to_u32(snapshot.local.size)?;
        let offset = to_u32(snapshot.local.offset)?;
        if local != self.header.local || offset != self.header.offset {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Snapshot subdomain {:?}@{:?} does not match file {:?}@{:?}",
                    local, offset, self.header.local, self.header.offset
                ),
            ));
        }
        let cells = self.header.local_cells();
        if snapshot.u.len() != cells || snapshot.v.len() != cells {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Snapshot arrays hold {}/{} values, subdomain has {}",
                    snapshot.u.len(),
                    snapshot.v.len(),
                    cells
                ),
            ));
        }

        self.encode_buffer.clear();
        encode_values(&snapshot.u, &mut self.encode_buffer);
        encode_values(&snapshot.v, &mut self.encode_buffer);

        let position = self.data_end;
        self.writer.seek(SeekFrom::Start(position))?;
        let size = match self.header.compression {
            CompressionType::None => {
                self.writer.write_all(&self.encode_buffer)?;
                self.encode_buffer.len()
            }
            CompressionType::Lz4 => {
                let compressed = compress_lz4(&self.encode_buffer)?;
                self.writer.write_all(&compressed)?;
                compressed.len()
            }
        };

        self.data_end = position + size as u64;
        self.frame_indices.push(FrameIndex {
            step: snapshot.step,
            offset: position,
            size: size as u64,
        });
        self.commit()
    }

    /// Copy the frames of `reader` up to and including `through_step`.
    ///
    /// Used when resuming, so the replacement file keeps the history that led
    /// to the restart point. Returns the number of frames copied.
    pub fn append_from(
        &mut self,
        reader: &mut CheckpointReader,
        through_step: u64,
    ) -> io::Result<u64> {
        let frames: Vec<usize> = reader
            .steps()
            .enumerate()
            .filter(|&(_, step)| step <= through_step)
            .map(|(frame, _)| frame)
            .collect();
        for &frame in &frames {
            let snapshot = reader.read_frame(frame)?;
            self.write_frame(&snapshot)?;
        }
        Ok(frames.len() as u64)
    }

    /// Write the index table after the last frame and the frame count into
    /// the header, then flush.
    fn commit(&mut self) -> io::Result<()> {
        self.writer.seek(SeekFrom::Start(self.data_end))?;
        for index in &self.frame_indices {
            index.write_to(&mut self.writer)?;
        }
        self.header.frame_count = self.frame_indices.len() as u64;
        self.writer.seek(SeekFrom::Start(0))?;
        self.header.write_to(&mut self.writer)?;
        self.writer.flush()
    }

    /// Finalize the checkpoint file.
    ///
    /// Trims anything past the index table and, for a staged writer, moves the
    /// file over its target.
    pub fn finalize(mut self) -> io::Result<CheckpointStats> {
        self.commit()?;
        let frames = self.header.frame_count;
        let total_bytes = self.data_end + frames * FrameIndex::SIZE as u64;
        self.writer.get_ref().set_len(total_bytes)?;

        if let Some((partial, target)) = self.staged.take() {
            fs::rename(&partial, &target)?;
        }

        let data_bytes = self.data_end - CheckpointHeader::SIZE as u64;
        Ok(CheckpointStats {
            frame_count: frames,
            total_bytes,
            average_frame_size: if frames > 0 { data_bytes / frames } else { 0 },
            compression: self.header.compression,
        })
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frame_indices.len() as u64
    }

    /// File currently being written.
    pub fn staged_path(&self) -> Option<&Path> {
        self.staged.as_ref().map(|(partial, _)| partial.as_path())
    }
}

impl SnapshotSink for CheckpointWriter {
    fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
        Ok(self.write_frame(snapshot)?)
    }
}

fn to_u32(v: [usize; 3]) -> io::Result<[u32; 3]> {
    let mut out = [0u32; 3];
    for (o, &x) in out.iter_mut().zip(&v) {
        *o = u32::try_from(x).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("Extent {} exceeds u32", x))
        })?;
    }
    Ok(out)
}

/// Statistics from a writing session.
#[derive(Debug, Clone)]
pub struct CheckpointStats {
    /// Total frames written.
    pub frame_count: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Average stored frame size.
    pub average_frame_size: u64,
    /// Compression used.
    pub compression: CompressionType,
}

impl std::fmt::Display for CheckpointStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} bytes total, {} bytes/frame avg ({:?} compression)",
            self.frame_count, self.total_bytes, self.average_frame_size, self.compression
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn local() -> LocalSubdomain {
        LocalSubdomain {
            size: [4, 3, 2],
            offset: [4, 0, 0],
        }
    }

    fn snapshot(step: u64) -> Snapshot {
        Snapshot {
            step,
            global: [8, 3, 2],
            local: local(),
            u: (0..24).map(|i| i as f64 + step as f64).collect(),
            v: vec![0.25; 24],
        }
    }

    #[test]
    fn test_writer_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basic.gsck");

        let mut writer =
            CheckpointWriter::create(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                .unwrap();
        for step in [10, 20, 30] {
            writer.write_frame(&snapshot(step)).unwrap();
        }
        assert_eq!(writer.frames_written(), 3);

        let stats = writer.finalize().unwrap();
        assert_eq!(stats.frame_count, 3);
        assert_eq!(stats.average_frame_size, 24 * 2 * 8);

        let len = fs::metadata(&path).unwrap().len();
        assert_eq!(len, stats.total_bytes);
        assert_eq!(
            len,
            (CheckpointHeader::SIZE + 3 * 24 * 2 * 8 + 3 * FrameIndex::SIZE) as u64
        );
    }

    #[test]
    fn test_writer_rejects_foreign_subdomain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.gsck");
        let mut writer =
            CheckpointWriter::create(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                .unwrap();

        let mut other = snapshot(1);
        other.local.offset = [0, 0, 0];
        assert!(writer.write_frame(&other).is_err());

        let mut short = snapshot(1);
        short.u.truncate(10);
        assert!(writer.write_frame(&short).is_err());
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn test_checkpoint_path() {
        assert_eq!(checkpoint_path("out/gs", 3), PathBuf::from("out/gs.0003.gsck"));
    }

    #[test]
    fn test_unfinished_writer_leaves_readable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crash.gsck");
        {
            let mut writer =
                CheckpointWriter::create(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                    .unwrap();
            writer.write_frame(&snapshot(3)).unwrap();
            writer.write_frame(&snapshot(6)).unwrap();
        }

        let mut reader = CheckpointReader::open(&path).unwrap();
        assert_eq!(reader.steps().collect::<Vec<_>>(), vec![3, 6]);
        assert_eq!(reader.read_step(6).unwrap(), snapshot(6));
    }

    #[test]
    fn test_replace_keeps_original_until_finalize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("restart.gsck");
        let mut writer =
            CheckpointWriter::create(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                .unwrap();
        writer.write_frame(&snapshot(3)).unwrap();
        writer.write_frame(&snapshot(6)).unwrap();
        writer.finalize().unwrap();

        // A resumed run that dies before its first output.
        {
            let mut reader = CheckpointReader::open(&path).unwrap();
            let restart = reader.read_step(3).unwrap();
            assert_eq!(restart, snapshot(3));
            let mut resumed =
                CheckpointWriter::replace(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                    .unwrap();
            assert_eq!(resumed.append_from(&mut reader, 3).unwrap(), 1);
            assert!(resumed.staged_path().unwrap().exists());
        }
        let reader = CheckpointReader::open(&path).unwrap();
        assert_eq!(reader.steps().collect::<Vec<_>>(), vec![3, 6]);

        // A resumed run that completes replaces the file.
        let mut reader = CheckpointReader::open(&path).unwrap();
        let mut resumed =
            CheckpointWriter::replace(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                .unwrap();
        let partial = resumed.staged_path().unwrap().to_path_buf();
        resumed.append_from(&mut reader, 3).unwrap();
        resumed.write_frame(&snapshot(9)).unwrap();
        drop(reader);
        resumed.finalize().unwrap();

        assert!(!partial.exists());
        let mut reader = CheckpointReader::open(&path).unwrap();
        assert_eq!(reader.steps().collect::<Vec<_>>(), vec![3, 9]);
        assert_eq!(reader.read_step(9).unwrap(), snapshot(9));
    }

    #[test]
    fn test_stored_frames_match_header_compression() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.gsck");
        let mut writer =
            CheckpointWriter::create(&path, [8, 3, 2], local(), 1.0, CompressionType::None)
                .unwrap();
        writer.write_frame(&snapshot(1)).unwrap();
        let stats = writer.finalize().unwrap();
        assert_eq!(stats.compression, CompressionType::None);
        assert_eq!(stats.average_frame_size, 24 * 2 * 8);

        let lz4 = CheckpointWriter::create(
            dir.path().join("lz4.gsck"),
            [8, 3, 2],
            local(),
            1.0,
            CompressionType::Lz4,
        );
        if cfg!(feature = "lz4") {
            let mut writer = lz4.unwrap();
            let mut uniform = snapshot(1);
            uniform.u = vec![1.0; 24];
            writer.write_frame(&uniform).unwrap();
            let stats = writer.finalize().unwrap();
            assert_eq!(stats.compression, CompressionType::Lz4);
            assert!(stats.average_frame_size < 24 * 2 * 8);
        } else {
            assert_eq!(lz4.err().unwrap().kind(), io::ErrorKind::Unsupported);
        }
    }
}
