use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use log::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::StoreError;

/// Builds an in-memory deflate ZIP of the given files, each stored under its
/// bare file name. Paths that do not exist are skipped.
pub fn batch_export_zip<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<u8>, StoreError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in paths {
        let path = path.as_ref();
        if !path.is_file() {
            debug!("Skipping missing export entry {}", path.display());
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        writer.start_file(name, options)?;
        writer.write_all(&fs::read(path)?)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_export_contains_only_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();

        let bytes = batch_export_zip(&[a, dir.path().join("ghost.png"), b]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a.png", "b.png"]);

        let mut content = String::new();
        archive.by_name("b.png").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "second");
    }

    #[test]
    fn test_export_of_nothing_is_a_valid_archive() {
        let bytes = batch_export_zip::<&Path>(&[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
