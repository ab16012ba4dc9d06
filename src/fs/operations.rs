//! Opening the source and destination files
//!
//! Both handles are returned buffered and are closed when dropped, so an
//! early return on any setup error releases whatever was already opened.

use crate::error::{IoResultExt, Result, SeqCopyError};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Open the source file for buffered reading
pub fn open_source(path: &Path, buffer_size: usize) -> Result<BufReader<File>> {
    let file = File::open(path).with_path(path)?;

    let metadata = file.metadata().with_path(path)?;
    if metadata.is_dir() {
        return Err(SeqCopyError::NotAFile(path.to_path_buf()));
    }

    Ok(BufReader::with_capacity(buffer_size, file))
}

/// Create or truncate the destination file for buffered writing
///
/// Refuses to truncate the source when both paths name the same file.
pub fn create_destination(
    source: &Path,
    destination: &Path,
    buffer_size: usize,
) -> Result<BufWriter<File>> {
    if is_same_file(source, destination) {
        return Err(SeqCopyError::SameSourceAndDestination(
            destination.to_path_buf(),
        ));
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .with_path(destination)?;

    Ok(BufWriter::with_capacity(buffer_size, file))
}

/// Check whether two paths resolve to the same existing file
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
