use crate::error::{StorageError, StorageResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Read;

/// Bundle `(file name, contents)` pairs into a gzip-compressed tarball.
///
/// Entries are flat: only the last path segment of each name is kept.
pub fn build_archive<'a, I>(entries: I, mtime: u64) -> StorageResult<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, data) in entries {
        let file_name = name.rsplit('/').next().unwrap_or(name);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder
            .append_data(&mut header, file_name, data)
            .map_err(|e| StorageError::Archive(format!("{}: {}", file_name, e)))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Archive(e.to_string()))
}

/// Unpack a tarball produced by [`build_archive`] into `(name, contents)`.
pub fn read_archive(bytes: &[u8]) -> StorageResult<Vec<(String, Vec<u8>)>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut out = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| StorageError::Archive(e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| StorageError::Archive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| StorageError::Archive(e.to_string()))?;
        out.push((name, data));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_flattened() {
        let bytes = build_archive(
            [
                ("scan_results/t-execution-1/Bandit.log", b"bandit".as_slice()),
                ("Trivy.log", b"".as_slice()),
            ],
            0,
        )
        .unwrap();
        let entries = read_archive(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("Bandit.log".to_string(), b"bandit".to_vec()));
        assert_eq!(entries[1].0, "Trivy.log");
        assert!(entries[1].1.is_empty());
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let bytes = build_archive(std::iter::empty(), 0).unwrap();
        assert!(read_archive(&bytes).unwrap().is_empty());
    }
}
