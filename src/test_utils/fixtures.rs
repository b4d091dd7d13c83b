//! Update archive fixtures.

use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

/// One entry of a test archive, stored with a Unix mode.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    name: String,
    contents: Option<Vec<u8>>,
    mode: u32,
}

impl ZipEntry {
    pub fn file(name: &str, contents: &[u8], mode: u32) -> Self {
        Self {
            name: name.to_string(),
            contents: Some(contents.to_vec()),
            mode,
        }
    }

    /// A directory entry; `name` should end with `/`.
    pub fn dir(name: &str, mode: u32) -> Self {
        Self {
            name: name.to_string(),
            contents: None,
            mode,
        }
    }
}

/// Zip `entries` in order into memory. Names are stored verbatim, including
/// hostile ones such as `../escape`.
pub fn zip_bytes(entries: &[ZipEntry]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let options = SimpleFileOptions::default().unix_permissions(entry.mode);
        match &entry.contents {
            Some(contents) => {
                writer.start_file(entry.name.as_str(), options).expect("start zip entry");
                writer.write_all(contents).expect("write zip entry");
            }
            None => {
                writer.add_directory(entry.name.as_str(), options).expect("add zip directory");
            }
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Write an archive of `entries` to `path`.
pub fn write_zip(path: &Path, entries: &[ZipEntry]) {
    std::fs::write(path, zip_bytes(entries)).expect("write zip file");
}
