//! Test utilities for nativedeps-lib.
//!
//! Helpers that produce small source archives on disk so fetch and unpack
//! code can be exercised without network access.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Write a `.tar.gz` archive whose entries all live under `top/`.
pub fn write_tar_gz(archive: &Path, top: &str, files: &[(&str, &str)]) {
  let file = File::create(archive).unwrap();
  let encoder = GzEncoder::new(file, Compression::default());
  let mut builder = tar::Builder::new(encoder);

  for (name, content) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{}/{}", top, name), content.as_bytes())
      .unwrap();
  }

  builder.into_inner().unwrap().finish().unwrap();
}

/// Write a `.zip` archive whose entries all live under `top/`.
pub fn write_zip(archive: &Path, top: &str, files: &[(&str, &str)]) {
  let file = File::create(archive).unwrap();
  let mut writer = zip::ZipWriter::new(file);
  let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

  for (name, content) in files {
    writer.start_file(format!("{}/{}", top, name), options).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
  }

  writer.finish().unwrap();
}

/// Returns a `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
  format!("file://{}", path.display())
}
