use super::bucket_file::BucketFile;
use crate::Result;
use crate::io::{ObjectReader, ObjectWriter};
use ohno::bail;
use std::path::{Path, PathBuf};

/// Log target for tiled storage
const LOG_TARGET: &str = "       tsm";

const TYPE_NAME: &str = "TSMFile";
const VERSION: u32 = 1;

/// One data file of a tiled storage manager.
///
/// The file is identified by its sequence number within the storage manager
/// and tracks its logical length, which grows as hypercubes claim space.
#[derive(Debug)]
pub struct TsmFile {
    seqnr: u32,
    length: u64,
    file: BucketFile,
}

/// The name of the data file with the given sequence number.
#[must_use]
pub fn file_name(stman_file_name: &Path, seqnr: u32) -> PathBuf {
    let mut name = stman_file_name.as_os_str().to_os_string();
    name.push(format!("_TSM{seqnr}"));
    PathBuf::from(name)
}

impl TsmFile {
    /// Create a new, empty data file.
    pub fn create(stman_file_name: &Path, seqnr: u32) -> Result<Self> {
        let file = BucketFile::create(file_name(stman_file_name, seqnr))?;
        log::debug!(target: LOG_TARGET, "Created data file '{}'", file.name().display());

        Ok(Self { seqnr, length: 0, file })
    }

    /// Reconstruct a data file from its persisted descriptor and open it.
    ///
    /// The descriptor must carry the sequence number the caller expects;
    /// anything else means the storage manager header is corrupt.
    pub fn from_stream(stman_file_name: &Path, reader: &mut ObjectReader<'_>, seqnr: u32, writable: bool) -> Result<Self> {
        let (stored_seqnr, length) = read_descriptor(reader)?;
        if stored_seqnr != seqnr {
            bail!("internal error: TSMFile sequence number {stored_seqnr} does not match expected {seqnr}");
        }

        let file = BucketFile::open(file_name(stman_file_name, seqnr), writable)?;
        Ok(Self { seqnr, length, file })
    }

    /// Write the descriptor: version, sequence number, and length.
    pub fn put_object(&self, writer: &mut ObjectWriter) -> Result<()> {
        writer.put_start(TYPE_NAME, VERSION)?;
        writer.put_u32(self.seqnr);
        writer.put_u64(self.length);
        Ok(())
    }

    /// Read back a descriptor written by [`Self::put_object`] into this file.
    pub fn get_object(&mut self, reader: &mut ObjectReader<'_>) -> Result<()> {
        let (seqnr, length) = read_descriptor(reader)?;
        self.seqnr = seqnr;
        self.length = length;
        Ok(())
    }

    #[must_use]
    pub const fn seqnr(&self) -> u32 {
        self.seqnr
    }

    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Reserve `nbytes` at the end of the file, returning the offset of the new space.
    pub const fn extend(&mut self, nbytes: u64) -> u64 {
        let offset = self.length;
        self.length += nbytes;
        offset
    }

    #[must_use]
    pub const fn bucket_file(&self) -> &BucketFile {
        &self.file
    }

    pub const fn bucket_file_mut(&mut self) -> &mut BucketFile {
        &mut self.file
    }
}

fn read_descriptor(reader: &mut ObjectReader<'_>) -> Result<(u32, u64)> {
    let version = reader.get_start(TYPE_NAME)?;
    if version != VERSION {
        bail!("internal error: unsupported TSMFile version {version}");
    }
    let seqnr = reader.get_u32()?;
    let length = reader.get_u64()?;
    Ok((seqnr, length))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name(Path::new("/data/obs.tab/table.f0"), 3),
            PathBuf::from("/data/obs.tab/table.f0_TSM3")
        );
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_descriptor_roundtrip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let stman = temp_dir.path().join("table.f0");

        let mut file = TsmFile::create(&stman, 3).unwrap();
        assert_eq!(file.extend(4096), 0);
        assert_eq!(file.extend(4096), 4096);

        let mut writer = ObjectWriter::new();
        file.put_object(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = ObjectReader::new(&bytes);
        let reopened = TsmFile::from_stream(&stman, &mut reader, 3, true).unwrap();
        assert_eq!(reopened.seqnr(), 3);
        assert_eq!(reopened.length(), 8192);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_sequence_number_mismatch_is_internal_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let stman = temp_dir.path().join("table.f0");

        let file = TsmFile::create(&stman, 3).unwrap();
        let mut writer = ObjectWriter::new();
        file.put_object(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = ObjectReader::new(&bytes);
        let err = TsmFile::from_stream(&stman, &mut reader, 4, true).unwrap_err();
        assert!(err.to_string().contains("internal error"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_create_in_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let stman = temp_dir.path().join("no_such_dir").join("table.f0");
        let err = TsmFile::create(&stman, 0).unwrap_err();
        assert!(err.to_string().contains("unable to create file"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_get_object_restores_state() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let stman = temp_dir.path().join("table.f0");

        let mut file = TsmFile::create(&stman, 1).unwrap();
        let _ = file.extend(100);
        let mut writer = ObjectWriter::new();
        file.put_object(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let _ = file.extend(900);
        file.get_object(&mut ObjectReader::new(&bytes)).unwrap();
        assert_eq!(file.length(), 100);
    }
}
