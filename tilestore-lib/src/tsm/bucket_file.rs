use crate::Result;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A physical file holding fixed-size buckets (tiles) at arbitrary offsets.
#[derive(Debug)]
pub struct BucketFile {
    name: PathBuf,
    file: File,
    writable: bool,
}

impl BucketFile {
    /// Create the file, truncating an existing one.
    pub fn create(name: impl AsRef<Path>) -> Result<Self> {
        let name = name.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&name)
            .into_app_err_with(|| format!("unable to create file '{}'", name.display()))?;

        Ok(Self {
            name,
            file,
            writable: true,
        })
    }

    pub fn open(name: impl AsRef<Path>, writable: bool) -> Result<Self> {
        let name = name.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&name)
            .into_app_err_with(|| format!("unable to open file '{}'", name.display()))?;

        Ok(Self { name, file, writable })
    }

    #[must_use]
    pub fn name(&self) -> &Path {
        &self.name
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Fill `buf` from `offset`; the part beyond the end of the file reads as zeros.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let _ = self
            .file
            .seek(SeekFrom::Start(offset))
            .into_app_err_with(|| format!("unable to seek in file '{}'", self.name.display()))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(e).into_app_err_with(|| format!("unable to read {} bytes at offset {offset} from '{}'", buf.len(), self.name.display()));
                }
            }
        }

        buf[filled..].fill(0);
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let _ = self
            .file
            .seek(SeekFrom::Start(offset))
            .into_app_err_with(|| format!("unable to seek in file '{}'", self.name.display()))?;
        self.file
            .write_all(buf)
            .into_app_err_with(|| format!("unable to write {} bytes at offset {offset} to '{}'", buf.len(), self.name.display()))
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        self.file
            .sync_data()
            .into_app_err_with(|| format!("unable to flush file '{}'", self.name.display()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_read_beyond_end_is_zero() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut file = BucketFile::create(temp_dir.path().join("buckets")).unwrap();

        file.write_at(4, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0xFFu8; 12];
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_reopen_read_only() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("buckets");
        {
            let mut file = BucketFile::create(&path).unwrap();
            file.write_at(0, b"tile").unwrap();
            file.flush().unwrap();
        }

        let mut file = BucketFile::open(&path, false).unwrap();
        assert!(!file.is_writable());
        let mut buf = [0u8; 4];
        file.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"tile");
        let _ = file.write_at(0, b"nope").unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_open_missing_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = BucketFile::open(temp_dir.path().join("missing"), true).unwrap_err();
        assert!(err.to_string().contains("unable to open file"));
    }
}
