//! File and directory operations on resolved server paths.
//!
//! Nothing here keeps a file descriptor across requests: every read or
//! write opens the file, positions explicitly and closes it again.

use crate::{Drive, DosFileProperties, NameConversion};
use nd_attrs::AttrMode;
use nd_dos::attr::{FAT_DIRECTORY, FAT_NONE, FAT_RO};
use nd_dos::date::unix2fat;
use nd_dos::fcb::FcbName;
use nd_dos::{exterr, msg2err, Error};
use std::fs::OpenOptions;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// An operation failure carrying the DOS code reported to the client.
#[derive(Debug)]
pub struct DriveError {
    code: u16,
    what: String,
}

impl DriveError {
    pub fn new(code: u16, what: impl Into<String>) -> Self {
        Self {
            code,
            what: what.into(),
        }
    }

    /// The DOS extended error code for the reply `ax` field.
    pub fn code(&self) -> u16 {
        self.code
    }
}

impl std::fmt::Display for DriveError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{} (DOS error {})", self.what, self.code)
    }
}

impl std::error::Error for DriveError {}

/// Map an I/O failure to the closest DOS code.
fn dos_io_code(err: &std::io::Error) -> u16 {
    match err.kind() {
        std::io::ErrorKind::NotFound => exterr::FILE_NOT_FOUND,
        _ => exterr::ACCESS_DENIED,
    }
}

/// Delete a single file; directories are refused.
fn delete_one(path: &Path) -> Result<(), DriveError> {
    if !path.exists() {
        return Err(DriveError::new(
            exterr::FILE_NOT_FOUND,
            format!("file does not exist: {path:?}"),
        ));
    }
    if path.is_dir() {
        return Err(DriveError::new(exterr::FILE_NOT_FOUND, format!("is a directory: {path:?}")));
    }
    std::fs::remove_file(path).map_err(|err| DriveError::new(dos_io_code(&err), format!("cannot delete {path:?}: {err}")))
}

impl Drive {
    /// DOS properties for a server path, or None when it cannot be
    /// inspected (which usually means it does not exist).
    pub fn server_path_properties(&self, path: &Path) -> Option<DosFileProperties> {
        let meta = std::fs::metadata(path).ok()?;
        let mut props = DosFileProperties::default();
        if let Some(file_name) = path.file_name() {
            props.fcb_name = FcbName::from_short_name(file_name.as_bytes());
        }
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        props.time_date = unix2fat(mtime);

        if meta.is_dir() {
            props.attrs = FAT_DIRECTORY;
            return Some(props);
        }

        // DOS cannot express sizes of 2 GiB and above
        props.size = meta.len().min(0x7FFF_FFFF) as u32;
        props.attrs = match self.backend().get(path) {
            Ok(attrs) => attrs,
            Err(err) => {
                warn!("attributes of {path:?}: {err:#}");
                FAT_NONE
            }
        };
        Some(props)
    }

    /// DOS properties for a client path.
    pub fn dos_properties(&mut self, client_path: &Path) -> Result<Option<DosFileProperties>, Error> {
        let (server_path, _exists) = self.server_path(client_path, false)?;
        Ok(self.server_path_properties(&server_path))
    }

    /// Read into `buf` from the file behind `handle` at `offset`.
    ///
    /// A short read at the end of the file is not an error.
    pub fn read_file(&mut self, buf: &mut [u8], handle: u16, offset: u32) -> Result<usize, Error> {
        let path = self.handle_path(handle)?;
        let file = std::fs::File::open(&path)?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read_at(&mut buf[total..], offset as u64 + total as u64)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Write `data` to the file behind `handle` at `offset`.
    ///
    /// Empty data truncates or extends the file to `offset`.
    pub fn write_file(&mut self, data: &[u8], handle: u16, offset: u32) -> Result<usize, Error> {
        if self.read_only() {
            return Err(msg2err!("drive is read-only"));
        }
        let path = self.handle_path(handle)?;

        if data.is_empty() {
            debug!("write_file: truncate {path:?} to {offset} bytes");
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(offset as u64)?;
            return Ok(0);
        }

        debug!("write_file: {} bytes into {path:?} at offset {offset}", data.len());
        let file = OpenOptions::new().write(true).open(&path)?;
        let mut total = 0;
        while total < data.len() {
            let n = file.write_at(&data[total..], offset as u64 + total as u64)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Size of the file behind `handle`.
    pub fn file_size(&mut self, handle: u16) -> Result<u32, Error> {
        let path = self.handle_path(handle)?;
        self.server_path_properties(&path)
            .map(|props| props.size)
            .ok_or_else(|| msg2err!(format!("cannot stat {path:?}")))
    }

    /// Create the directory named by a client path.
    pub fn make_dir(&mut self, client_path: &Path) -> Result<(), Error> {
        if self.read_only() {
            return Err(msg2err!("drive is read-only"));
        }
        let (server_path, exists) = self.server_path(client_path, false)?;
        if exists {
            return Err(msg2err!(format!("directory exists: {server_path:?}")));
        }
        std::fs::create_dir(&server_path)?;
        self.refresh_listing(client_path);
        Ok(())
    }

    /// Remove the directory named by a client path.
    pub fn delete_dir(&mut self, client_path: &Path) -> Result<(), Error> {
        if self.read_only() {
            return Err(msg2err!("drive is read-only"));
        }
        let (server_path, exists) = self.server_path(client_path, false)?;
        if !exists {
            return Err(msg2err!(format!("directory does not exist: {server_path:?}")));
        }
        if !server_path.is_dir() {
            return Err(msg2err!(format!("not a directory: {server_path:?}")));
        }
        std::fs::remove_dir(&server_path)?;
        self.refresh_listing(client_path);
        Ok(())
    }

    /// Check that a client path names an existing directory.
    pub fn change_dir(&mut self, client_path: &Path) -> Result<(), Error> {
        let (server_path, exists) = self.server_path(client_path, false)?;
        if !exists || !server_path.is_dir() {
            return Err(msg2err!(format!("directory does not exist: {server_path:?}")));
        }
        Ok(())
    }

    /// Persist the attribute byte for a client path.
    pub fn set_attrs(&mut self, client_path: &Path, attrs: u8) -> Result<(), Error> {
        if self.attr_mode() == AttrMode::Ignore {
            // the drive has no attribute storage
            return Ok(());
        }
        if self.read_only() {
            return Err(msg2err!("drive is read-only"));
        }
        let (server_path, _exists) = self.server_path(client_path, false)?;
        self.backend().set(&server_path, attrs)?;
        self.refresh_listing(client_path);
        Ok(())
    }

    /// Rename a client path to another client path.
    pub fn rename_file(&mut self, old_client_path: &Path, new_client_path: &Path) -> Result<(), Error> {
        if self.read_only() {
            return Err(msg2err!("drive is read-only"));
        }
        let (old_server, _) = self.server_path(old_client_path, false)?;
        let (new_server, _) = self.server_path(new_client_path, false)?;
        std::fs::rename(&old_server, &new_server)
            .map_err(|err| msg2err!(format!("cannot rename {old_server:?} to {new_server:?}: {err}")))?;
        self.refresh_listing(new_client_path);
        Ok(())
    }

    /// Create or truncate a file with the given attribute bits.
    pub fn create_or_truncate(&mut self, server_path: &Path, attrs: u8) -> Result<DosFileProperties, Error> {
        if self.read_only() {
            return Err(msg2err!("drive is read-only"));
        }
        std::fs::File::create(server_path)?;
        if let Err(err) = self.backend().set(server_path, attrs) {
            error!("create_or_truncate: failed to set attributes {attrs:#04x} on {server_path:?}: {err:#}");
        }
        self.server_path_properties(server_path)
            .ok_or_else(|| msg2err!(format!("cannot stat created file {server_path:?}")))
    }

    /// Delete the file named by a client path, or every matching file
    /// when the path carries `?` wildcards.
    ///
    /// Per-file failures during a wildcard sweep are logged and the
    /// sweep continues; the first failure is reported at the end.
    pub fn delete_files(&mut self, client_pattern: &Path) -> Result<(), DriveError> {
        if self.read_only() {
            return Err(DriveError::new(exterr::ACCESS_DENIED, "drive is read-only"));
        }
        let (server_path, exists) = self
            .server_path(client_pattern, false)
            .map_err(|err| DriveError::new(exterr::FILE_NOT_FOUND, format!("{err:#}")))?;

        // a read-only file refuses the whole request
        if let Some(props) = self.server_path_properties(&server_path) {
            if props.attrs & FAT_RO != 0 {
                return Err(DriveError::new(
                    exterr::ACCESS_DENIED,
                    format!("{server_path:?} is read-only"),
                ));
            }
        }

        if exists {
            delete_one(&server_path)?;
            self.refresh_listing(client_pattern);
            return Ok(());
        }

        if !server_path.as_os_str().as_bytes().contains(&b'?') {
            return Err(DriveError::new(
                exterr::FILE_NOT_FOUND,
                format!("file does not exist: {server_path:?}"),
            ));
        }

        let directory = match server_path.parent() {
            Some(dir) => dir.to_path_buf(),
            None => {
                return Err(DriveError::new(
                    exterr::FILE_NOT_FOUND,
                    format!("pattern has no directory: {server_path:?}"),
                ))
            }
        };
        let mask = FcbName::from_short_name(
            client_pattern.file_name().map(OsStrExt::as_bytes).unwrap_or_default(),
        );

        let targets: Vec<PathBuf> = if self.name_conversion() == NameConversion::Off {
            // without name conversion the filesystem is traversed directly
            let entries = std::fs::read_dir(&directory)
                .map_err(|err| DriveError::new(dos_io_code(&err), format!("cannot scan {directory:?}: {err}")))?;
            entries
                .flatten()
                .filter(|entry| !entry.path().is_dir())
                .filter(|entry| FcbName::from_short_name(entry.file_name().as_bytes()).matches(&mask))
                .map(|entry| entry.path())
                .collect()
        } else {
            let handle = self.get_handle(&directory);
            if self.items[handle as usize].listing.is_empty() {
                self.build_listing(handle)
                    .map_err(|err| DriveError::new(exterr::FILE_NOT_FOUND, format!("{err:#}")))?;
            }
            self.items[handle as usize]
                .listing
                .iter()
                .filter(|props| props.attrs & FAT_DIRECTORY == 0 && props.fcb_name.matches(&mask))
                .map(|props| directory.join(&props.server_name))
                .collect()
        };

        let mut first_error = None;
        for path in targets {
            if let Err(err) = delete_one(&path) {
                error!("delete_files: {err}");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        self.refresh_listing(client_pattern);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_drive;

    #[test]
    fn read_write_round_trip() {
        let (mut drive, root) = test_drive("rw");
        std::fs::write(root.join("data.bin"), b"0123456789").unwrap();
        let handle = drive.get_handle(&root.join("data.bin"));

        let mut buf = [0u8; 4];
        assert_eq!(drive.read_file(&mut buf, handle, 2).unwrap(), 4);
        assert_eq!(&buf, b"2345");

        // a short read past the end is fine
        let mut buf = [0u8; 16];
        assert_eq!(drive.read_file(&mut buf, handle, 6).unwrap(), 4);

        assert_eq!(drive.write_file(b"AB", handle, 1).unwrap(), 2);
        assert_eq!(std::fs::read(root.join("data.bin")).unwrap(), b"0AB3456789");
    }

    #[test]
    fn zero_length_write_truncates() {
        let (mut drive, root) = test_drive("trunc");
        std::fs::write(root.join("data.bin"), b"0123456789").unwrap();
        let handle = drive.get_handle(&root.join("data.bin"));

        assert_eq!(drive.write_file(b"", handle, 3).unwrap(), 0);
        assert_eq!(std::fs::read(root.join("data.bin")).unwrap(), b"012");
        assert_eq!(drive.file_size(handle).unwrap(), 3);

        // extending works the same way
        assert_eq!(drive.write_file(b"", handle, 8).unwrap(), 0);
        assert_eq!(drive.file_size(handle).unwrap(), 8);
    }

    #[test]
    fn write_needs_an_existing_file() {
        let (mut drive, root) = test_drive("nofile");
        let handle = drive.get_handle(&root.join("missing.bin"));
        assert!(drive.write_file(b"x", handle, 0).is_err());
    }

    #[test]
    fn make_and_delete_dir() {
        let (mut drive, root) = test_drive("mkdir");
        drive.make_dir(Path::new("new")).unwrap();
        assert!(root.join("new").is_dir());
        // creating it again fails
        assert!(drive.make_dir(Path::new("new")).is_err());

        drive.change_dir(Path::new("new")).unwrap();
        drive.delete_dir(Path::new("new")).unwrap();
        assert!(!root.join("new").exists());
        assert!(drive.change_dir(Path::new("new")).is_err());
    }

    #[test]
    fn create_truncates_existing_content() {
        let (mut drive, root) = test_drive("create");
        std::fs::write(root.join("old.txt"), b"previous content").unwrap();
        let props = drive.create_or_truncate(&root.join("old.txt"), 0).unwrap();
        assert_eq!(props.size, 0);
        assert_eq!(std::fs::read(root.join("old.txt")).unwrap(), b"");
    }

    #[test]
    fn rename_moves_the_file() {
        let (mut drive, root) = test_drive("rename");
        std::fs::write(root.join("a.txt"), b"x").unwrap();
        drive.rename_file(Path::new("a.txt"), Path::new("b.txt")).unwrap();
        assert!(!root.join("a.txt").exists());
        assert!(root.join("b.txt").exists());
    }

    #[test]
    fn delete_single_file() {
        let (mut drive, root) = test_drive("del");
        std::fs::write(root.join("a.txt"), b"x").unwrap();
        drive.delete_files(Path::new("a.txt")).unwrap();
        assert!(!root.join("a.txt").exists());

        let err = drive.delete_files(Path::new("a.txt")).unwrap_err();
        assert_eq!(err.code(), exterr::FILE_NOT_FOUND);
    }

    #[test]
    fn delete_by_pattern_skips_directories() {
        let (mut drive, root) = test_drive("delpat");
        std::fs::write(root.join("a.txt"), b"x").unwrap();
        std::fs::write(root.join("b.txt"), b"x").unwrap();
        std::fs::write(root.join("keep.doc"), b"x").unwrap();
        std::fs::create_dir(root.join("dir.txt")).unwrap();

        drive.delete_files(Path::new("????????.txt")).unwrap();
        assert!(!root.join("a.txt").exists());
        assert!(!root.join("b.txt").exists());
        assert!(root.join("keep.doc").exists());
        assert!(root.join("dir.txt").is_dir());
    }

    #[test]
    fn read_only_drive_refuses_mutation() {
        let (mut drive, root) = test_drive("rodrv");
        std::fs::write(root.join("a.txt"), b"x").unwrap();
        drive.set_read_only(true);
        let handle = drive.get_handle(&root.join("a.txt"));

        assert!(drive.write_file(b"y", handle, 0).is_err());
        assert!(drive.make_dir(Path::new("new")).is_err());
        assert!(drive.rename_file(Path::new("a.txt"), Path::new("b.txt")).is_err());
        assert_eq!(
            drive.delete_files(Path::new("a.txt")).unwrap_err().code(),
            exterr::ACCESS_DENIED
        );
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn properties_of_a_file() {
        let (mut drive, root) = test_drive("props");
        std::fs::write(root.join("readme.txt"), vec![0u8; 123]).unwrap();
        let props = drive.dos_properties(Path::new("readme.txt")).unwrap().unwrap();
        assert_eq!(props.size, 123);
        assert_eq!(&props.fcb_name.base, b"README  ");
        assert_eq!(props.attrs & FAT_DIRECTORY, 0);

        let props = drive.dos_properties(Path::new("")).unwrap().unwrap();
        assert_eq!(props.attrs & FAT_DIRECTORY, FAT_DIRECTORY);

        assert!(drive.dos_properties(Path::new("missing.txt")).unwrap().is_none());
    }
}
