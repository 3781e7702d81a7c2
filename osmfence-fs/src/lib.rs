//! Capability-based filesystem helpers built on `cap-std` and `camino`.
//!
//! Ambient paths are only resolved at the edges (`open_*_ambient`);
//! everything below a working directory goes through a [`fs_utf8::Dir`]
//! handle so region data cannot escape it.
#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

/// Open an existing file by ambient path.
///
/// # Errors
/// Returns the I/O error raised by the open call.
pub fn open_file_ambient(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Create (or truncate) a file by ambient path, creating missing parent
/// directories.
///
/// # Errors
/// Returns the I/O error raised while creating directories or the file.
pub fn create_file_ambient(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("`{path}` does not name a file")))?;
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new(""));
    let dir = open_dir_ambient(parent, true)?;
    dir.create(name)
}

/// Open a directory by ambient path, creating it first when `create` is set.
///
/// # Errors
/// Returns the I/O error raised while resolving or creating the directory.
pub fn open_dir_ambient(path: &Utf8Path, create: bool) -> io::Result<fs_utf8::Dir> {
    let (base, relative) = split_base(path)?;
    if relative.as_str().is_empty() {
        return Ok(base);
    }
    if create {
        base.create_dir_all(&relative)?;
    }
    base.open_dir(&relative)
}

/// Split a path into an ambient root handle and the path relative to it.
///
/// Absolute paths resolve from the filesystem root (or the Windows drive /
/// UNC prefix); relative paths from the current directory.
///
/// # Errors
/// Returns an error when the root cannot be opened or a component is not
/// valid UTF-8.
pub fn split_base(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();
    let root = match std_path.components().next() {
        Some(Component::Prefix(prefix)) => {
            let drive = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            Some(Utf8PathBuf::from(drive).join(std::path::MAIN_SEPARATOR_STR))
        }
        Some(Component::RootDir) => Some(Utf8PathBuf::from(std::path::MAIN_SEPARATOR_STR)),
        _ => None,
    };
    let Some(root) = root else {
        let dir = fs_utf8::Dir::open_ambient_dir(".", ambient_authority())?;
        return Ok((dir, path.to_path_buf()));
    };
    let relative = path
        .strip_prefix(&root)
        .map_err(|_| io::Error::other(format!("failed to strip `{root}` from `{path}`")))?
        .to_path_buf();
    let dir = fs_utf8::Dir::open_ambient_dir(&root, ambient_authority())?;
    Ok((dir, relative))
}

/// Read a file below `dir`, returning `None` when it does not exist.
///
/// # Errors
/// Returns any I/O error other than `NotFound`.
pub fn read_optional(dir: &fs_utf8::Dir, path: &Utf8Path) -> io::Result<Option<String>> {
    match dir.read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Create (or truncate) a file below `dir`, creating parent directories.
///
/// # Errors
/// Returns the I/O error raised while creating directories or the file.
pub fn create_file(dir: &fs_utf8::Dir, path: &Utf8Path) -> io::Result<fs_utf8::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        dir.create_dir_all(parent)?;
    }
    dir.create(path)
}

/// Replace a file below `dir` with `contents` atomically.
///
/// The data goes to a sibling temporary file which is synced and then
/// renamed over the target, so readers observe either the old or the new
/// contents.
///
/// # Errors
/// Returns the I/O error raised by any step; the temporary file is removed
/// on failure where possible.
pub fn write_atomic(dir: &fs_utf8::Dir, path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("`{path}` does not name a file")))?;
    let staging = path.with_file_name(format!(".{name}.tmp"));
    let written = create_file(dir, &staging).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    let renamed = written.and_then(|()| dir.rename(&staging, dir, path));
    if renamed.is_err() {
        drop(dir.remove_file(&staging));
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn scratch() -> (TempDir, fs_utf8::Dir) {
        let temp = TempDir::new().expect("temporary directory");
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        let dir = open_dir_ambient(&path, false).expect("open scratch dir");
        (temp, dir)
    }

    #[rstest]
    fn atomic_writes_replace_contents(scratch: (TempDir, fs_utf8::Dir)) {
        let (_temp, dir) = scratch;
        let target = Utf8Path::new("region/state.txt");
        write_atomic(&dir, target, b"first").expect("first write");
        write_atomic(&dir, target, b"second").expect("second write");
        assert_eq!(
            read_optional(&dir, target).expect("read"),
            Some("second".to_owned())
        );
        assert!(
            read_optional(&dir, Utf8Path::new("region/.state.txt.tmp"))
                .expect("read staging")
                .is_none(),
            "staging file is renamed away"
        );
    }

    #[rstest]
    fn missing_files_read_as_none(scratch: (TempDir, fs_utf8::Dir)) {
        let (_temp, dir) = scratch;
        assert_eq!(read_optional(&dir, Utf8Path::new("absent.txt")).expect("read"), None);
    }

    #[rstest]
    fn ambient_directories_are_created_on_request() {
        let temp = TempDir::new().expect("temporary directory");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        let nested = root.join("a/b");
        assert!(open_dir_ambient(&nested, false).is_err());
        open_dir_ambient(&nested, true).expect("create nested dir");
        let mut file = create_file_ambient(&nested.join("c/out.txt")).expect("create file");
        file.write_all(b"ok").expect("write");
        let contents = std::fs::read_to_string(nested.join("c/out.txt")).expect("read back");
        assert_eq!(contents, "ok");
    }
}
