//! File primitives for the sysfs and devfs surfaces.
//!
//! Every helper restarts on EINTR, distinguishes short results from errors,
//! and tags failures with the operation and the path that produced them.

use crate::error::Error;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Open a file read-only, retrying on EINTR.
pub fn open(path: impl AsRef<Path>) -> Result<File, Error> {
    open_with(path, File::options().read(true))
}

/// Open a file write-only (sysfs `brightness` is not readable).
pub fn open_wo(path: impl AsRef<Path>) -> Result<File, Error> {
    open_with(path, File::options().write(true))
}

/// Open a file read-write (`/dev/i2c-*` needs both directions).
pub fn open_rw(path: impl AsRef<Path>) -> Result<File, Error> {
    open_with(path, File::options().read(true).write(true))
}

fn open_with(path: impl AsRef<Path>, options: &std::fs::OpenOptions) -> Result<File, Error> {
    let path = path.as_ref();
    loop {
        match options.open(path) {
            Ok(file) => return Ok(file),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::io("open", path, err)),
        }
    }
}

/// One read(2), restarted on EINTR.
fn read_once(mut file: &File, buf: &mut [u8], path: &Path) -> Result<usize, Error> {
    loop {
        match file.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::io("read", path, err)),
        }
    }
}

/// Read a whitespace-trimmed base-10 integer from a sysfs attribute.
///
/// Reads at most 64 bytes and rejects input that exactly fills the buffer, so
/// a runaway attribute cannot be silently truncated into a wrong value.
/// Rewinds first: sysfs attributes are re-read from offset 0.
pub fn read_int(mut file: &File, path: &Path) -> Result<i64, Error> {
    file.seek(SeekFrom::Start(0))
        .map_err(|err| Error::io("seek", path, err))?;
    let mut buf = [0u8; 64];
    let n = read_once(file, &mut buf, path)?;
    if n == buf.len() {
        return Err(Error::Precondition(format!(
            "read {}: value longer than {} bytes",
            path.display(),
            buf.len()
        )));
    }
    let text = std::str::from_utf8(&buf[..n])
        .map_err(|_| Error::Precondition(format!("read {}: not ASCII", path.display())))?
        .trim();
    text.parse().map_err(|_| {
        Error::Precondition(format!("read {}: not an integer: {text:?}", path.display()))
    })
}

/// Read a `major:minor\n` device-number pair from a sysfs `dev` attribute.
pub fn read_devnum(file: &File, path: &Path) -> Result<nix::libc::dev_t, Error> {
    let mut buf = [0u8; 64];
    let n = read_once(file, &mut buf, path)?;
    if n == buf.len() {
        return Err(Error::Precondition(format!(
            "read {}: value longer than {} bytes",
            path.display(),
            buf.len()
        )));
    }
    let text = std::str::from_utf8(&buf[..n])
        .map_err(|_| Error::Precondition(format!("read {}: not ASCII", path.display())))?
        .trim();
    let parse = || -> Option<nix::libc::dev_t> {
        let (major, minor) = text.split_once(':')?;
        Some(nix::sys::stat::makedev(
            major.parse().ok()?,
            minor.parse().ok()?,
        ))
    };
    parse().ok_or_else(|| {
        Error::Precondition(format!(
            "read {}: unrecognized device number: {text:?}",
            path.display()
        ))
    })
}

/// Read up to `cap` bytes in a single read (EDID blobs, adapter names).
pub fn read_bytes(file: &File, path: &Path, cap: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; cap];
    let n = read_once(file, &mut buf, path)?;
    buf.truncate(n);
    Ok(buf)
}

/// Resolve a symlink, or `None` if the path does not exist.
pub fn read_link(path: impl AsRef<Path>) -> Result<Option<PathBuf>, Error> {
    let path = path.as_ref();
    match std::fs::read_link(path) {
        Ok(target) => Ok(Some(target)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::io("readlink", path, err)),
    }
}
