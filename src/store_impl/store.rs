//! Store implementation: one directory per file tag, one binary file per
//! named record, native-endian `f64` payloads.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::{CepaError, Result};

/// Logical scratch files, keyed by fixed identifiers.
///
/// The integral files are produced by the external integral transformation
/// and are read-only for the whole run; the remaining files are owned by
/// the solver and deleted at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FileTag {
    /// `(ij|kl)` occupied four-index block, `o^4`.
    Oooo = 260,
    /// `(ia|jb)` Coulomb-ordered block, `(ov)^2`.
    Ovov = 261,
    /// `(ij|ab)` exchange-ordered block, `(ov)^2`.
    Oovv = 262,
    /// `(ij|ak)` block sorted for the singles hole contraction, `o^3 v`.
    Ooov = 263,
    /// `(ij|ak)` block sorted for the mixed doubles contraction, `o^3 v`.
    Oovo = 264,
    /// `(ab|ci)` block streamed by the singles particle ladder, `o v^3`.
    Vvvo = 265,
    /// `(ab|ci)` block streamed into the doubles residual, `o v^3`.
    Vovv = 266,
    /// Symmetric packed `(ac|bd)+(ad|bc)` block, `(v(v+1)/2)^2`.
    VvvvPlus = 267,
    /// Antisymmetric packed `(ac|bd)-(ad|bc)` block, `(v(v+1)/2)^2`.
    VvvvMinus = 268,
    /// Full square AO-basis `(ac|bd)` block for the integral-direct path.
    VvvvAo = 269,
    /// Doubles residual.
    Residual = 280,
    /// Disk-resident doubles amplitudes.
    Doubles = 281,
    /// DIIS amplitude history.
    DiisOld = 282,
    /// DIIS error-vector history.
    DiisErr = 283,
}

impl FileTag {
    pub const fn id(&self) -> u16 {
        *self as u16
    }

    pub const fn filename(&self) -> &'static str {
        match self {
            FileTag::Oooo => "eri_oooo",
            FileTag::Ovov => "eri_ovov",
            FileTag::Oovv => "eri_oovv",
            FileTag::Ooov => "eri_ooov",
            FileTag::Oovo => "eri_oovo",
            FileTag::Vvvo => "eri_vvvo",
            FileTag::Vovv => "eri_vovv",
            FileTag::VvvvPlus => "eri_vvvv_plus",
            FileTag::VvvvMinus => "eri_vvvv_minus",
            FileTag::VvvvAo => "eri_vvvv_ao",
            FileTag::Residual => "r2",
            FileTag::Doubles => "t2",
            FileTag::DiisOld => "diis_old",
            FileTag::DiisErr => "diis_err",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create the file, discarding any previous contents.
    New,
    /// Open an existing file; missing files are a storage error.
    Old,
}

/// A store rooted at a scratch directory.
#[derive(Debug)]
pub struct TensorStore {
    root: PathBuf,
}

impl TensorStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn dir(&self, tag: FileTag) -> PathBuf {
        self.root.join(tag.filename())
    }

    pub fn open(&self, tag: FileTag, mode: Mode) -> Result<StoreFile> {
        let dir = self.dir(tag);
        match mode {
            Mode::New => {
                if dir.exists() {
                    fs::remove_dir_all(&dir)?;
                }
                fs::create_dir_all(&dir)?;
            }
            Mode::Old => {
                if !dir.is_dir() {
                    return Err(CepaError::Storage(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("scratch file {} has not been written", tag.filename()),
                    )));
                }
            }
        }
        Ok(StoreFile { dir })
    }

    /// Delete a file's backing storage if present.
    pub fn remove(&self, tag: FileTag) -> Result<()> {
        match fs::remove_dir_all(self.dir(tag)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, tag: FileTag) -> bool {
        self.dir(tag).is_dir()
    }
}

/// An open store file holding named records.
#[derive(Debug)]
pub struct StoreFile {
    dir: PathBuf,
}

impl StoreFile {
    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.bin"))
    }

    /// Write a whole record, replacing any previous contents.
    pub fn write_entry(&self, name: &str, data: &[f64]) -> Result<()> {
        let mut file = BufWriter::new(File::create(self.record_path(name))?);
        file.write_all(bytemuck::cast_slice(data))?;
        file.flush()?;
        Ok(())
    }

    /// Read a whole record into `out`; the record must hold at least
    /// `out.len()` values.
    pub fn read_entry(&self, name: &str, out: &mut [f64]) -> Result<()> {
        let mut file = BufReader::new(File::open(self.record_path(name))?);
        file.read_exact(bytemuck::cast_slice_mut(out))?;
        Ok(())
    }

    /// Sequential chunked reader over a record, for streaming tiled
    /// operands through a bounded buffer.
    pub fn reader(&self, name: &str) -> Result<RecordReader> {
        Ok(RecordReader {
            inner: BufReader::new(File::open(self.record_path(name))?),
        })
    }

    /// Sequential chunked writer, appending chunks from offset zero.
    pub fn writer(&self, name: &str) -> Result<RecordWriter> {
        Ok(RecordWriter {
            inner: BufWriter::new(File::create(self.record_path(name))?),
        })
    }

    /// Close the file; `keep = false` deletes the backing storage.
    pub fn close(self, keep: bool) -> Result<()> {
        if !keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

pub struct RecordReader {
    inner: BufReader<File>,
}

impl RecordReader {
    /// Read the next `out.len()` values.
    pub fn read_chunk(&mut self, out: &mut [f64]) -> Result<()> {
        self.inner.read_exact(bytemuck::cast_slice_mut(out))?;
        Ok(())
    }

    /// Reposition to an absolute element offset.
    pub fn seek_to(&mut self, index: usize) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start((index * std::mem::size_of::<f64>()) as u64))?;
        Ok(())
    }
}

pub struct RecordWriter {
    inner: BufWriter<File>,
}

impl RecordWriter {
    pub fn write_chunk(&mut self, data: &[f64]) -> Result<()> {
        self.inner.write_all(bytemuck::cast_slice(data))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Record names, one per integral block plus the solver-owned records.
/// The integral names are the fixed contract with the external integral
/// transformation.
pub const RECORD_OOOO: &str = "oooo";
pub const RECORD_OVOV: &str = "ovov";
pub const RECORD_OOVV: &str = "oovv";
pub const RECORD_OOOV: &str = "ooov";
pub const RECORD_OOVO: &str = "oovo";
pub const RECORD_VVVO: &str = "vvvo";
pub const RECORD_VOVV: &str = "vovv";
pub const RECORD_VVVV_PLUS: &str = "vvvv_plus";
pub const RECORD_VVVV_MINUS: &str = "vvvv_minus";
pub const RECORD_VVVV_AO: &str = "vvvv_ao";
pub const RECORD_RESIDUAL: &str = "residual";

/// Residency of the doubles amplitudes, chosen once by the memory planner.
///
/// Contraction code is written against this handle and never branches on
/// where the tensor actually lives.
#[derive(Debug)]
pub enum AmplitudeStorage {
    InCore(Vec<f64>),
    OnDisk,
}

pub const RECORD_T2: &str = "t2";

impl AmplitudeStorage {
    /// Borrow the amplitudes, reading the disk record into `scratch` when
    /// they are not memory-resident.
    pub fn load<'a>(&'a self, store: &TensorStore, scratch: &'a mut [f64]) -> Result<&'a [f64]> {
        match self {
            AmplitudeStorage::InCore(t2) => Ok(t2),
            AmplitudeStorage::OnDisk => {
                let file = store.open(FileTag::Doubles, Mode::Old)?;
                file.read_entry(RECORD_T2, scratch)?;
                file.close(true)?;
                Ok(scratch)
            }
        }
    }

    /// Read the amplitudes into `out` unconditionally.
    pub fn read_into(&self, store: &TensorStore, out: &mut [f64]) -> Result<()> {
        match self {
            AmplitudeStorage::InCore(t2) => {
                out.copy_from_slice(&t2[..out.len()]);
                Ok(())
            }
            AmplitudeStorage::OnDisk => {
                let file = store.open(FileTag::Doubles, Mode::Old)?;
                file.read_entry(RECORD_T2, out)?;
                file.close(true)?;
                Ok(())
            }
        }
    }

    /// Overwrite the amplitudes from `data`.
    pub fn write_from(&mut self, store: &TensorStore, data: &[f64]) -> Result<()> {
        match self {
            AmplitudeStorage::InCore(t2) => {
                t2.copy_from_slice(data);
                Ok(())
            }
            AmplitudeStorage::OnDisk => {
                let file = store.open(FileTag::Doubles, Mode::Old)?;
                file.write_entry(RECORD_T2, data)?;
                file.close(true)?;
                Ok(())
            }
        }
    }

    pub fn on_disk(&self) -> bool {
        matches!(self, AmplitudeStorage::OnDisk)
    }
}
