//! A virtual FAT view over a host directory tree.
//!
//! Each shared drive letter maps to one [`Drive`]: a canonical root
//! directory, a 16-bit handle table with cached directory listings,
//! and the 8.3 name mapping between client paths and server paths.
//! Handles are purely logical; no file descriptor survives a request.

use nd_attrs::{AttrMode, Backend, Synthesized};
use nd_dos::date::unix_now;
use nd_dos::fcb::FcbName;
use nd_dos::{msg2err, Error};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod dir;
pub mod file;
mod name;

pub use dir::DosFileProperties;
pub use file::DriveError;

/// How client file names map to server file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameConversion {
    /// Pass through: server names must already be valid short names.
    Off,
    /// Build an in-memory 8.3 mapping per directory listing.
    Ram,
}

/// Handles are 16 bit with 0xFFFF reserved as the error value.
const MAX_HANDLE_COUNT: usize = 65535;

/// Cached listings older than this many seconds are dropped on the
/// next handle scan.
const LISTING_MAX_AGE: i64 = 3600;

/// One slot of the handle table. An empty path marks a free slot.
#[derive(Default)]
pub(crate) struct Item {
    pub(crate) path: PathBuf,
    pub(crate) last_used: i64,
    pub(crate) listing: Vec<DosFileProperties>,
    pub(crate) fcb_names: BTreeSet<FcbName>,
}

/// One shared drive letter.
///
/// Every consumer holds a stable reference; the type is deliberately
/// neither `Clone` nor `Copy`.
pub struct Drive {
    root: PathBuf,
    used: bool,
    read_only: bool,
    label: Option<FcbName>,
    name_conversion: NameConversion,
    attr_mode: AttrMode,
    backend: Box<dyn Backend>,
    items: Vec<Item>,
}

impl Drive {
    pub fn new() -> Self {
        Self {
            root: PathBuf::new(),
            used: false,
            read_only: false,
            label: None,
            name_conversion: NameConversion::Ram,
            attr_mode: AttrMode::Auto,
            backend: Box::new(Synthesized),
            items: Vec::new(),
        }
    }

    /// Is this drive shared?
    pub fn is_shared(&self) -> bool {
        self.used
    }

    /// The canonical root of the share.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn name_conversion(&self) -> NameConversion {
        self.name_conversion
    }

    /// The effective attribute mode after `set_root` resolved AUTO.
    pub fn attr_mode(&self) -> AttrMode {
        self.attr_mode
    }

    pub fn label(&self) -> Option<FcbName> {
        self.label
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn set_name_conversion(&mut self, conversion: NameConversion) {
        self.name_conversion = conversion;
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn set_attr_mode(&mut self, mode: AttrMode) {
        self.attr_mode = mode;
    }

    /// The volume label reported by searches with the VOLUME filter.
    pub fn set_label(&mut self, label: &str) {
        self.label = Some(FcbName::from_label(label.as_bytes()));
    }

    /// Assign the share root. This is a one-shot: re-assignment fails.
    ///
    /// Resolves the configured attribute mode against the root, so the
    /// mode must be set up front.
    pub fn set_root(&mut self, root: PathBuf) -> Result<(), Error> {
        if self.used {
            return Err(msg2err!("drive root already assigned"));
        }
        let (mode, backend) = nd_attrs::select(self.attr_mode, &root);
        self.attr_mode = mode;
        self.backend = backend;
        self.root = root;
        self.used = true;
        Ok(())
    }

    /// Return a stable handle for a server path within this drive.
    ///
    /// Prefers a cache hit, then the first free slot, then growing the
    /// table, and finally recycles the least recently used slot.
    pub fn get_handle(&mut self, server_path: &Path) -> u16 {
        let now = unix_now();
        let mut first_free = self.items.len();
        let mut oldest = 0;

        for handle in 0..self.items.len() {
            if self.items[handle].path == server_path {
                self.items[handle].last_used = now;
                debug!("get_handle: found handle {handle} for {server_path:?} in cache");
                return handle as u16;
            }

            if now - self.items[handle].last_used > LISTING_MAX_AGE && !self.items[handle].listing.is_empty() {
                // it will be regenerated when needed
                debug!("get_handle: dropping stale listing of handle {handle}");
                self.items[handle].listing = Vec::new();
                self.items[handle].fcb_names = BTreeSet::new();
            }

            if first_free == self.items.len() {
                if self.items[handle].path.as_os_str().is_empty() {
                    first_free = handle;
                } else if self.items[oldest].last_used > self.items[handle].last_used {
                    oldest = handle;
                }
            }
        }

        if first_free == self.items.len() {
            if first_free < MAX_HANDLE_COUNT {
                self.items.push(Item::default());
            } else {
                // all handles are used, recycle the oldest one
                let item = &mut self.items[oldest];
                item.path = PathBuf::new();
                item.listing = Vec::new();
                item.fcb_names = BTreeSet::new();
                first_free = oldest;
            }
        }

        let item = &mut self.items[first_free];
        item.path = server_path.to_path_buf();
        item.last_used = now;
        first_free as u16
    }

    pub(crate) fn get_item(&mut self, handle: u16) -> Result<&mut Item, Error> {
        let index = handle as usize;
        if index >= self.items.len() {
            return Err(msg2err!(format!(
                "handle {handle} is invalid, only {} handles are allocated",
                self.items.len()
            )));
        }
        if self.items[index].path.as_os_str().is_empty() {
            return Err(msg2err!(format!("handle {handle} is invalid because it is empty")));
        }
        Ok(&mut self.items[index])
    }

    /// The path behind a handle, refreshing its timestamp.
    pub fn handle_path(&mut self, handle: u16) -> Result<PathBuf, Error> {
        let now = unix_now();
        let item = self.get_item(handle)?;
        item.last_used = now;
        Ok(item.path.clone())
    }

    /// Translate a relative client path into a server path.
    ///
    /// The second value reports whether the path exists. Under RAM name
    /// conversion every component is looked up by its FCB form in the
    /// parent listing; a missing last component keeps the client name,
    /// a missing intermediate component fails the request.
    pub fn server_path(&mut self, client_path: &Path, rebuild_listing: bool) -> Result<(PathBuf, bool), Error> {
        if client_path.as_os_str().is_empty() {
            return Ok((self.root.clone(), true));
        }

        if self.name_conversion == NameConversion::Off {
            let server_path = self.root.join(client_path);
            let exists = server_path.exists();
            return Ok((server_path, exists));
        }

        let mut server_path = self.root.clone();
        let components: Vec<&OsStr> = client_path.iter().collect();
        for (n, component) in components.iter().enumerate() {
            let fcb_name = FcbName::from_short_name(component.as_bytes());
            let handle = self.get_handle(&server_path);
            match self.server_name(handle, &fcb_name, rebuild_listing)? {
                Some(real_name) => server_path.push(real_name),
                None if n + 1 == components.len() => {
                    // a missing last component keeps the client name
                    server_path.push(component);
                    return Ok((server_path, false));
                }
                None => {
                    return Err(msg2err!(format!(
                        "parent path not found: {:?}",
                        server_path.join(component)
                    )));
                }
            }
        }
        Ok((server_path, true))
    }

    /// Rebuild the cached listings along a client path after a change.
    pub fn refresh_listing(&mut self, client_path: &Path) {
        if let Err(err) = self.server_path(client_path, true) {
            debug!("listing refresh for {client_path:?}: {err:#}");
        }
    }

    /// Filesystem total size and free space below the root, in bytes.
    pub fn space_info(&self) -> Result<(u64, u64), Error> {
        if !self.used {
            return Err(msg2err!("drive is not shared"));
        }
        let cpath = std::ffi::CString::new(self.root.as_os_str().as_bytes())
            .map_err(|_| msg2err!("root path contains a NUL byte"))?;
        let mut stat: libc::statvfs = unsafe { core::mem::zeroed() };
        if unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) } == -1 {
            return Err(msg2err!(format!(
                "statvfs on {:?}: {}",
                self.root,
                std::io::Error::last_os_error()
            )));
        }
        Ok((
            stat.f_blocks as u64 * stat.f_frsize as u64,
            stat.f_bavail as u64 * stat.f_frsize as u64,
        ))
    }
}

impl Default for Drive {
    fn default() -> Self {
        Self::new()
    }
}

/// The table of all drive letters the protocol can address.
pub struct Drives {
    infos: [Drive; 26],
}

impl Drives {
    pub const COUNT: usize = 26;

    pub fn new() -> Self {
        Self {
            infos: std::array::from_fn(|_| Drive::new()),
        }
    }

    pub fn get(&self, index: usize) -> &Drive {
        &self.infos[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Drive {
        &mut self.infos[index]
    }

    /// All drives with their letters.
    pub fn iter(&self) -> impl Iterator<Item = (char, &Drive)> {
        self.infos.iter().enumerate().map(|(i, d)| ((b'A' + i as u8) as char, d))
    }
}

impl Default for Drives {
    fn default() -> Self {
        Self::new()
    }
}
