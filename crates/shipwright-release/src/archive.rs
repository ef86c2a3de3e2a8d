//! Reproducible `.tar.gz` archives.

use flate2::Compression;
use flate2::GzBuilder;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tar::{EntryType, Header};
use tracing::debug;

/// Archive the contents of `src` into a gzip-compressed tarball at `dest`.
///
/// Entries are stored relative to `src` in file name order with zeroed
/// timestamps and ownership, so identical inputs give identical bytes.
pub fn archive_dir(src: &Path, dest: &Path) -> std::io::Result<()> {
    let file = BufWriter::new(File::create(dest)?);
    let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut entries = 0;
    for entry in walkdir::WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let file_type = entry.file_type();
        let metadata = entry.metadata().map_err(std::io::Error::from)?;

        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, rel, std::io::empty())?;
        } else if file_type.is_file() {
            header.set_entry_type(EntryType::Regular);
            header.set_mode(if is_executable(&metadata) { 0o755 } else { 0o644 });
            header.set_size(metadata.len());
            builder.append_data(&mut header, rel, File::open(entry.path())?)?;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
            continue;
        }
        entries += 1;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    debug!(src = %src.display(), dest = %dest.display(), entries, "Created archive");
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_: &std::fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    fn entries(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path().unwrap().display().to_string();
                path.trim_end_matches('/').to_string()
            })
            .collect()
    }

    #[test]
    fn test_archive_is_reproducible() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("bin")).unwrap();
        std::fs::write(src.path().join("bin/tool"), "#!/bin/sh\n").unwrap();
        std::fs::write(src.path().join("README.md"), "tool").unwrap();

        let out = tempfile::tempdir().unwrap();
        let first = out.path().join("a.tar.gz");
        let second = out.path().join("b.tar.gz");
        archive_dir(src.path(), &first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        archive_dir(src.path(), &second).unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        assert_eq!(entries(&first), vec!["README.md", "bin", "bin/tool"]);
    }
}
