//! DOS attribute storage backends.
//!
//! A drive presents a single attribute byte per file. Depending on the
//! host filesystem the byte lives in FAT metadata, in platform file
//! flags, or in one extended attribute; filesystems without any of
//! that get synthesized bits.

use nd_dos::attr::{FAT_ARCHIVE, FAT_NONE, FAT_PERSISTABLE};
use nd_dos::Error;
use std::path::Path;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux as platform;

#[cfg(target_os = "freebsd")]
mod freebsd;
#[cfg(target_os = "freebsd")]
use freebsd as platform;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
use macos as platform;

#[cfg(not(any(target_os = "linux", target_os = "freebsd", target_os = "macos")))]
mod fallback;
#[cfg(not(any(target_os = "linux", target_os = "freebsd", target_os = "macos")))]
use fallback as platform;

/// How DOS attributes are stored for a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    /// Probe NATIVE, then IN_EXTENDED, then fall back to synthesized.
    Auto,
    /// Reads synthesize, writes are a no-op.
    Ignore,
    /// FAT metadata or platform file flags.
    Native,
    /// One byte under a fixed extended-attribute name.
    InExtended,
}

impl std::str::FromStr for AttrMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "IGNORE" => Ok(Self::Ignore),
            "NATIVE" => Ok(Self::Native),
            "IN_EXTENDED" => Ok(Self::InExtended),
            _ => Err(Error::msg(format!("unknown attribute mode {s:?}"))),
        }
    }
}

/// Get or set the attribute byte for a native path.
pub trait Backend {
    /// Can this backend serve files below the given path?
    fn probe(&self, path: &Path) -> bool;

    /// Return the attribute bits stored for `path`.
    fn get(&self, path: &Path) -> Result<u8, Error>;

    /// Persist the settable bits of `attrs` for `path`.
    fn set(&self, path: &Path, attrs: u8) -> Result<(), Error>;
}

/// Default bits when nothing is stored: directories carry no bits,
/// files the archive bit.
pub fn synthesize(path: &Path) -> u8 {
    if path.is_dir() {
        FAT_NONE
    } else {
        FAT_ARCHIVE
    }
}

/// FAT metadata or platform file flags.
pub struct Native;

impl Backend for Native {
    fn probe(&self, path: &Path) -> bool {
        platform::native_probe(path)
    }

    fn get(&self, path: &Path) -> Result<u8, Error> {
        platform::native_get(path)
    }

    fn set(&self, path: &Path, attrs: u8) -> Result<(), Error> {
        platform::native_set(path, attrs & FAT_PERSISTABLE)
    }
}

/// One byte under a fixed extended-attribute name.
///
/// A file without the attribute reads as the synthesized default; a
/// set that matches the default removes the attribute again.
pub struct Extended;

impl Backend for Extended {
    fn probe(&self, path: &Path) -> bool {
        platform::xattr_probe(path)
    }

    fn get(&self, path: &Path) -> Result<u8, Error> {
        match platform::xattr_get(path)? {
            Some(byte) => Ok(byte & FAT_PERSISTABLE),
            None => Ok(synthesize(path)),
        }
    }

    fn set(&self, path: &Path, attrs: u8) -> Result<(), Error> {
        let attrs = attrs & FAT_PERSISTABLE;
        if attrs == synthesize(path) {
            return platform::xattr_remove(path);
        }
        platform::xattr_set(path, attrs)
    }
}

/// No persistent storage at all.
pub struct Synthesized;

impl Backend for Synthesized {
    fn probe(&self, _path: &Path) -> bool {
        true
    }

    fn get(&self, path: &Path) -> Result<u8, Error> {
        Ok(synthesize(path))
    }

    fn set(&self, _path: &Path, _attrs: u8) -> Result<(), Error> {
        Ok(())
    }
}

/// Resolve the configured mode against a drive root.
///
/// Returns the effective mode together with the backend serving it.
pub fn select(mode: AttrMode, root: &Path) -> (AttrMode, Box<dyn Backend>) {
    match mode {
        AttrMode::Auto => {
            if Native.probe(root) {
                (AttrMode::Native, Box::new(Native))
            } else if Extended.probe(root) {
                (AttrMode::InExtended, Box::new(Extended))
            } else {
                (AttrMode::Ignore, Box::new(Synthesized))
            }
        }
        AttrMode::Native => (mode, Box::new(Native)),
        AttrMode::InExtended => (mode, Box::new(Extended)),
        AttrMode::Ignore => (mode, Box::new(Synthesized)),
    }
}

/// Turn a path into a C string for the libc calls.
pub(crate) fn cpath(path: &Path) -> Result<std::ffi::CString, Error> {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::msg(format!("path {path:?} contains a NUL byte")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_dos::attr::{FAT_HIDDEN, FAT_RO, FAT_SYSTEM};

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("nd-attrs-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn synthesized_bits() {
        let dir = temp_dir("synth");
        let file = dir.join("file");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(Synthesized.get(&dir).unwrap(), FAT_NONE);
        assert_eq!(Synthesized.get(&file).unwrap(), FAT_ARCHIVE);
        // writes are accepted and dropped
        Synthesized.set(&file, FAT_RO).unwrap();
        assert_eq!(Synthesized.get(&file).unwrap(), FAT_ARCHIVE);
    }

    #[test]
    fn extended_round_trip() {
        let dir = temp_dir("xattr");
        let file = dir.join("file");
        std::fs::write(&file, b"x").unwrap();
        if !Extended.probe(&dir) {
            // the filesystem under the temp directory has no user xattrs
            return;
        }
        assert_eq!(Extended.get(&file).unwrap(), FAT_ARCHIVE);
        for attrs in [FAT_RO, FAT_RO | FAT_HIDDEN | FAT_SYSTEM, FAT_ARCHIVE | FAT_RO] {
            Extended.set(&file, attrs).unwrap();
            assert_eq!(Extended.get(&file).unwrap(), attrs & FAT_PERSISTABLE);
        }
        // the default removes the stored byte again
        Extended.set(&file, FAT_ARCHIVE).unwrap();
        assert_eq!(Extended.get(&file).unwrap(), FAT_ARCHIVE);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("auto".parse::<AttrMode>().unwrap(), AttrMode::Auto);
        assert_eq!("IN_EXTENDED".parse::<AttrMode>().unwrap(), AttrMode::InExtended);
        assert!("bogus".parse::<AttrMode>().is_err());
    }

    #[test]
    fn auto_resolves() {
        let dir = temp_dir("auto");
        let (mode, backend) = select(AttrMode::Auto, &dir);
        assert_ne!(mode, AttrMode::Auto);
        // whatever was selected must serve reads
        std::fs::write(dir.join("f"), b"x").unwrap();
        backend.get(&dir.join("f")).unwrap();
    }
}
