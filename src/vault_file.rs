//! Flat vault file I/O
//!
//! A vault file is `16 * n` bytes of records stored back to back: no header,
//! no footer, no padding. Record `i` lives at byte offset `i * 16`.
//!
//! Writers stage into a temporary file next to the target and rename it into
//! place only after a successful flush, so an interrupted run never leaves a
//! partial file at the target path.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tempfile::NamedTempFile;

use crate::config;
use crate::error::{Result, VaultError};
use crate::record::{Record, RECORD_SIZE};

const WRITE_BUFFER: usize = 8 * 1024 * 1024;
/// Mode of published vault files; staged temp files start out owner-only
#[cfg(unix)]
const VAULT_FILE_MODE: u32 = 0o644;
const READ_BUFFER: usize = 4 * 1024 * 1024;

/// Random access over a sorted record sequence
pub trait RecordSource {
    /// Number of records
    fn len(&self) -> u64;

    /// Record at `index`; `OutOfBounds` outside `[0, len)`
    fn record_at(&mut self, index: u64) -> Result<Record>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_bounds(index: u64, len: u64) -> Result<()> {
    if index >= len {
        return Err(VaultError::OutOfBounds { index, len });
    }
    Ok(())
}

impl RecordSource for [Record] {
    fn len(&self) -> u64 {
        <[Record]>::len(self) as u64
    }

    fn record_at(&mut self, index: u64) -> Result<Record> {
        check_bounds(index, RecordSource::len(self))?;
        Ok(self[index as usize])
    }
}

impl RecordSource for Vec<Record> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn record_at(&mut self, index: u64) -> Result<Record> {
        self.as_mut_slice().record_at(index)
    }
}

/// A validated vault file on disk
#[derive(Debug, Clone)]
pub struct VaultFile {
    path: PathBuf,
    records: u64,
}

impl VaultFile {
    /// Open and check that the size is a whole number of records
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        if len % RECORD_SIZE as u64 != 0 {
            return Err(VaultError::Misaligned { len });
        }
        Ok(Self {
            path,
            records: len / RECORD_SIZE as u64,
        })
    }

    /// Open and additionally require exactly `2^k` records
    pub fn open_with_exponent(path: impl AsRef<Path>, k: u32) -> Result<Self> {
        let vault = Self::open(path)?;
        vault.expect_exponent(k)?;
        Ok(vault)
    }

    pub fn expect_exponent(&self, k: u32) -> Result<()> {
        let expected = config::expected_file_size(k)?;
        if self.size_bytes() != expected {
            return Err(VaultError::SizeMismatch {
                k,
                expected,
                actual: self.size_bytes(),
            });
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn size_bytes(&self) -> u64 {
        self.records * RECORD_SIZE as u64
    }

    /// Sequential reader over every record
    pub fn stream(&self) -> Result<RecordStream> {
        RecordStream::open(&self.path, self.records)
    }

    /// Seek-based random access
    pub fn seek_reader(&self) -> Result<SeekReader> {
        let file = File::open(&self.path)?;
        Ok(SeekReader {
            file,
            records: self.records,
        })
    }

    /// Memory-mapped random access
    pub fn mapped(&self) -> Result<MappedVault> {
        let file = File::open(&self.path)?;
        let mmap = if self.records == 0 {
            None
        } else {
            // SAFETY: vault files are never mutated in place once written; writers
            // replace them by rename, which leaves existing mappings intact.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(MappedVault {
            mmap,
            records: self.records,
        })
    }
}

/// Number of records in a vault file
pub fn record_count(path: impl AsRef<Path>) -> Result<u64> {
    Ok(VaultFile::open(path)?.records())
}

/// Read the record at `index` (seeks to `index * 16`)
pub fn read_at(path: impl AsRef<Path>, index: u64) -> Result<Record> {
    VaultFile::open(path)?.seek_reader()?.record_at(index)
}

/// Stream every record in file order
pub fn read_all(path: impl AsRef<Path>) -> Result<RecordStream> {
    VaultFile::open(path)?.stream()
}

/// Write records verbatim; returns the number written
pub fn write_records(path: impl AsRef<Path>, records: &[Record]) -> Result<u64> {
    let mut writer = AtomicRecordWriter::create(path)?;
    writer.write_all_records(records)?;
    writer.finish()
}

/// Streaming record iterator with a constant-size buffer
pub struct RecordStream {
    reader: BufReader<File>,
    remaining: u64,
}

impl RecordStream {
    fn open(path: &Path, records: u64) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::with_capacity(READ_BUFFER, file),
            remaining: records,
        })
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let mut buf = [0u8; RECORD_SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                self.remaining -= 1;
                Some(Ok(Record::from_bytes(buf)))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e.into()))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

/// Random access by seeking the underlying file
pub struct SeekReader {
    file: File,
    records: u64,
}

impl RecordSource for SeekReader {
    fn len(&self) -> u64 {
        self.records
    }

    fn record_at(&mut self, index: u64) -> Result<Record> {
        check_bounds(index, self.records)?;
        let mut buf = [0u8; RECORD_SIZE];
        self.file
            .seek(SeekFrom::Start(index * RECORD_SIZE as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(Record::from_bytes(buf))
    }
}

/// Random access through a read-only memory map
pub struct MappedVault {
    mmap: Option<Mmap>,
    records: u64,
}

impl MappedVault {
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl RecordSource for MappedVault {
    fn len(&self) -> u64 {
        self.records
    }

    fn record_at(&mut self, index: u64) -> Result<Record> {
        check_bounds(index, self.records)?;
        let start = index as usize * RECORD_SIZE;
        let mut buf = [0u8; RECORD_SIZE];
        buf.copy_from_slice(&self.as_bytes()[start..start + RECORD_SIZE]);
        Ok(Record::from_bytes(buf))
    }
}

/// Buffered writer that only publishes the target on `finish`
///
/// Dropping it without calling `finish` deletes the staged file.
pub struct AtomicRecordWriter {
    writer: BufWriter<NamedTempFile>,
    target: PathBuf,
    written: u64,
}

impl AtomicRecordWriter {
    pub fn create(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staged = NamedTempFile::new_in(&dir)?;
        Ok(Self {
            writer: BufWriter::with_capacity(WRITE_BUFFER, staged),
            target,
            written: 0,
        })
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.writer.write_all(record.as_bytes())?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all_records(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, sync and rename into place; returns the record count
    pub fn finish(self) -> Result<u64> {
        let staged = self
            .writer
            .into_inner()
            .map_err(io::IntoInnerError::into_error)?;
        publish_permissions(staged.as_file())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.target).map_err(|e| e.error)?;
        Ok(self.written)
    }
}

#[cfg(unix)]
fn publish_permissions(file: &File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(VAULT_FILE_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn publish_permissions(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: u8) -> Vec<Record> {
        (0..n).map(|i| Record::from_nonce([i, 0, 0, 0, 0, 1])).collect()
    }

    #[test]
    fn test_write_then_read_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        let records = sample(10);

        assert_eq!(write_records(&path, &records).unwrap(), 10);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 160);

        let read: Vec<Record> = read_all(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(read, records);
    }

    #[cfg(unix)]
    #[test]
    fn test_written_vault_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        write_records(&path, &sample(2)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_read_at_and_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        let records = sample(5);
        write_records(&path, &records).unwrap();

        assert_eq!(read_at(&path, 3).unwrap(), records[3]);
        assert!(matches!(
            read_at(&path, 5),
            Err(VaultError::OutOfBounds { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_misaligned_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, [0u8; 17]).unwrap();

        assert!(matches!(
            VaultFile::open(&path),
            Err(VaultError::Misaligned { len: 17 })
        ));
    }

    #[test]
    fn test_exponent_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        write_records(&path, &sample(15)).unwrap();

        assert!(matches!(
            VaultFile::open_with_exponent(&path, 4),
            Err(VaultError::SizeMismatch { k: 4, expected: 256, actual: 240 })
        ));
    }

    #[test]
    fn test_mapped_matches_seek_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        write_records(&path, &sample(8)).unwrap();
        let vault = VaultFile::open(&path).unwrap();

        let mut seek = vault.seek_reader().unwrap();
        let mut mapped = vault.mapped().unwrap();
        for i in 0..8 {
            assert_eq!(seek.record_at(i).unwrap(), mapped.record_at(i).unwrap());
        }
        assert!(mapped.record_at(8).is_err());
    }

    #[test]
    fn test_empty_file_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();
        let mut mapped = VaultFile::open(&path).unwrap().mapped().unwrap();
        assert!(mapped.is_empty());
        assert!(mapped.record_at(0).is_err());
    }

    #[test]
    fn test_unfinished_writer_leaves_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        {
            let mut writer = AtomicRecordWriter::create(&path).unwrap();
            writer.write_all_records(&sample(4)).unwrap();
        }
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
