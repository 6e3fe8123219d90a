//! Directory listings and the FIND cursor.

use crate::{name, Drive, NameConversion};
use nd_dos::attr::{FAT_DIRECTORY, FAT_HIDDEN, FAT_SYSTEM, FAT_VOLUME};
use nd_dos::date::{unix2fat, unix_now};
use nd_dos::fcb::FcbName;
use nd_dos::Error;
use std::collections::BTreeSet;
use std::ffi::OsString;
use tracing::{debug, warn};

/// The DOS-visible metadata of one directory entry.
#[derive(Clone, Debug, Default)]
pub struct DosFileProperties {
    pub fcb_name: FcbName,
    /// File size in bytes, clamped below 2 GiB.
    pub size: u32,
    /// Packed FAT timestamp, date in the high word.
    pub time_date: u32,
    pub attrs: u8,
    /// The real name of the entry on the server.
    pub server_name: OsString,
}

impl Drive {
    /// Enumerate the directory behind `handle` into its cached listing.
    ///
    /// The listing starts with synthesized `.` and `..` entries and is
    /// capped at 65535 entries since DOS FIND uses a 16-bit index. The
    /// witness set guarantees FCB names are unique within the listing.
    pub(crate) fn build_listing(&mut self, handle: u16) -> Result<usize, Error> {
        let dir_path = self.get_item(handle)?.path.clone();
        let ram = self.name_conversion() == NameConversion::Ram;

        let mut listing = Vec::new();
        let mut fcb_names = BTreeSet::new();

        for dot in [".", ".."] {
            let mut props = self.server_path_properties(&dir_path.join(dot)).unwrap_or_default();
            props.fcb_name = FcbName::from_short_name(dot.as_bytes());
            if ram {
                props.server_name = dot.into();
            }
            listing.push(props);
        }

        for entry in std::fs::read_dir(&dir_path)? {
            let entry = entry?;
            if listing.len() == 0xFFFF {
                warn!("directory {dir_path:?} contains more than 65535 entries");
                break;
            }
            let file_name = entry.file_name();
            let Some(mut props) = self.server_path_properties(&entry.path()) else {
                continue;
            };
            if ram {
                if !name::file_name_to_83(&file_name, &mut props.fcb_name, &mut fcb_names) {
                    warn!("no free 8.3 name for {file_name:?} in {dir_path:?}");
                    continue;
                }
                props.server_name = file_name;
            }
            debug!("listing: {:?} -> {:?}", props.server_name, props.fcb_name);
            listing.push(props);
        }

        let count = listing.len();
        let item = &mut self.items[handle as usize];
        item.listing = listing;
        item.fcb_names = fcb_names;
        item.last_used = unix_now();
        Ok(count)
    }

    /// Look up the real server name of an FCB name in a listing.
    pub(crate) fn server_name(
        &mut self,
        handle: u16,
        fcb_name: &FcbName,
        rebuild_listing: bool,
    ) -> Result<Option<OsString>, Error> {
        if rebuild_listing || self.items[handle as usize].listing.is_empty() {
            self.build_listing(handle)?;
        }
        for props in &self.items[handle as usize].listing {
            if props.fcb_name == *fcb_name {
                return Ok(Some(props.server_name.clone()));
            }
        }
        Ok(None)
    }

    /// Advance the FIND cursor through the listing behind `handle`.
    ///
    /// Starts at entry `nth`; a cursor of zero forces a fresh listing.
    /// On a match, `nth` moves one past the matched index. Attribute
    /// filtering follows DOS FindFirst: a VOLUME filter only returns
    /// volume entries, otherwise hidden, system and directory entries
    /// need their bit in the filter.
    pub fn find_file(
        &mut self,
        handle: u16,
        mask: &FcbName,
        attr: u8,
        nth: &mut u16,
    ) -> Result<Option<DosFileProperties>, Error> {
        self.get_item(handle)?;
        let is_root_dir = self.items[handle as usize].path == self.root();

        // the volume label is a pseudo entry in front of the root listing
        if attr == FAT_VOLUME && is_root_dir {
            if *nth == 0 {
                if let Some(label) = self.label() {
                    *nth = 1;
                    return Ok(Some(DosFileProperties {
                        fcb_name: label,
                        attrs: FAT_VOLUME,
                        time_date: unix2fat(unix_now()),
                        ..Default::default()
                    }));
                }
            }
            return Ok(None);
        }

        if *nth == 0 || self.items[handle as usize].listing.is_empty() {
            let count = self.build_listing(handle)?;
            debug!(
                "find_file: scanned {:?}, {count} entries",
                self.items[handle as usize].path
            );
        }

        let item = &self.items[handle as usize];
        for n in (*nth as usize)..item.listing.len() {
            let props = &item.listing[n];

            // the root directory has no dot entries
            if is_root_dir && props.fcb_name.base[0] == b'.' {
                continue;
            }
            if !props.fcb_name.matches(mask) {
                continue;
            }
            if attr == FAT_VOLUME {
                if props.attrs & FAT_VOLUME == 0 {
                    continue;
                }
            } else if (attr | (props.attrs & (FAT_HIDDEN | FAT_SYSTEM | FAT_DIRECTORY))) != attr {
                continue;
            }

            *nth = (n + 1) as u16;
            return Ok(Some(props.clone()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_drive;
    use nd_dos::attr::FAT_ARCHIVE;
    use std::path::Path;

    /// All-wildcard mask.
    fn any_mask() -> FcbName {
        FcbName::from_short_name(b"????????.???")
    }

    #[test]
    fn listing_has_unique_fcb_names() {
        let (mut drive, root) = test_drive("unique");
        for n in 0..20 {
            std::fs::write(root.join(format!("collision file {n}.txt")), b"x").unwrap();
        }
        let handle = drive.get_handle(&root);
        drive.build_listing(handle).unwrap();

        let listing = &drive.items[handle as usize].listing;
        let names: BTreeSet<FcbName> = listing.iter().map(|p| p.fcb_name).collect();
        assert_eq!(names.len(), listing.len());
        assert_eq!(listing.len(), 22); // 20 files plus the dot entries
    }

    #[test]
    fn listing_of_empty_directory_keeps_the_dots() {
        let (mut drive, root) = test_drive("dots");
        let sub = root.join("sub");
        std::fs::create_dir(&sub).unwrap();
        let handle = drive.get_handle(&sub);
        assert_eq!(drive.build_listing(handle).unwrap(), 2);
        assert_eq!(&drive.items[handle as usize].listing[0].fcb_name.base, b".       ");
        assert_eq!(&drive.items[handle as usize].listing[1].fcb_name.base, b"..      ");
    }

    #[test]
    fn find_skips_dots_in_the_root() {
        let (mut drive, root) = test_drive("root-dots");
        std::fs::write(root.join("a.txt"), b"x").unwrap();
        let handle = drive.get_handle(&root);

        let mut nth = 0;
        let props = drive.find_file(handle, &any_mask(), 0xFF, &mut nth).unwrap().unwrap();
        assert_eq!(&props.fcb_name.base, b"A       ");
        assert!(drive.find_file(handle, &any_mask(), 0xFF, &mut nth).unwrap().is_none());
    }

    #[test]
    fn find_returns_dots_below_the_root() {
        let (mut drive, root) = test_drive("sub-dots");
        let sub = root.join("sub");
        std::fs::create_dir(&sub).unwrap();
        let handle = drive.get_handle(&sub);

        let mut nth = 0;
        let props = drive.find_file(handle, &any_mask(), 0xFF, &mut nth).unwrap().unwrap();
        assert_eq!(&props.fcb_name.base, b".       ");
        assert_eq!(props.attrs & FAT_DIRECTORY, FAT_DIRECTORY);
    }

    #[test]
    fn find_cursor_is_monotonic() {
        let (mut drive, root) = test_drive("cursor");
        for n in 0..5 {
            std::fs::write(root.join(format!("f{n}.txt")), b"x").unwrap();
        }
        let handle = drive.get_handle(&root);

        let mut nth = 0;
        let mut last = 0;
        let mut seen = 0;
        while let Some(_props) = drive.find_file(handle, &any_mask(), 0, &mut nth).unwrap() {
            assert!(nth > last);
            last = nth;
            seen += 1;
        }
        assert_eq!(seen, 5);
    }

    #[test]
    fn find_filters_directories() {
        let (mut drive, root) = test_drive("filter");
        std::fs::write(root.join("file.txt"), b"x").unwrap();
        std::fs::create_dir(root.join("subdir")).unwrap();
        let handle = drive.get_handle(&root);

        // a plain search hides the directory
        let mut nth = 0;
        let props = drive.find_file(handle, &any_mask(), 0, &mut nth).unwrap().unwrap();
        assert_eq!(props.attrs & FAT_DIRECTORY, 0);
        assert!(drive.find_file(handle, &any_mask(), 0, &mut nth).unwrap().is_none());

        // asking for directories returns both
        let mut nth = 0;
        let mut count = 0;
        while drive
            .find_file(handle, &any_mask(), FAT_DIRECTORY, &mut nth)
            .unwrap()
            .is_some()
        {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn find_matches_the_mask() {
        let (mut drive, root) = test_drive("mask");
        std::fs::write(root.join("readme.txt"), b"x").unwrap();
        std::fs::write(root.join("readme.doc"), b"x").unwrap();
        let handle = drive.get_handle(&root);

        let mask = FcbName::from_short_name(b"????????.txt");
        let mut nth = 0;
        let props = drive.find_file(handle, &mask, 0, &mut nth).unwrap().unwrap();
        assert_eq!(&props.fcb_name.ext, b"TXT");
        assert!(props.attrs & FAT_ARCHIVE != 0 || props.attrs == 0);
        assert!(drive.find_file(handle, &mask, 0, &mut nth).unwrap().is_none());
    }

    #[test]
    fn volume_label_pseudo_entry() {
        let (mut drive, root) = test_drive("label");
        drive.set_label("netdrive");
        let handle = drive.get_handle(&root);

        let mut nth = 0;
        let props = drive.find_file(handle, &any_mask(), FAT_VOLUME, &mut nth).unwrap().unwrap();
        assert_eq!(&props.fcb_name.base, b"NETDRIVE");
        assert_eq!(props.attrs, FAT_VOLUME);
        assert_eq!(nth, 1);
        assert!(drive.find_file(handle, &any_mask(), FAT_VOLUME, &mut nth).unwrap().is_none());

        // no label configured, nothing to report
        let (mut bare, bare_root) = test_drive("label-none");
        let handle = bare.get_handle(&bare_root);
        let mut nth = 0;
        assert!(bare.find_file(handle, &any_mask(), FAT_VOLUME, &mut nth).unwrap().is_none());
    }

    #[test]
    fn ram_mode_resolves_renamed_entries() {
        let (mut drive, root) = test_drive("rebuild");
        std::fs::write(root.join("first.txt"), b"x").unwrap();
        let (path, exists) = drive.server_path(Path::new("first.txt"), false).unwrap();
        assert!(exists);
        assert_eq!(path, root.join("first.txt"));

        // after a rename the forced rebuild sees the new name
        std::fs::rename(root.join("first.txt"), root.join("second.txt")).unwrap();
        let (_, exists) = drive.server_path(Path::new("first.txt"), true).unwrap();
        assert!(!exists);
        let (path, exists) = drive.server_path(Path::new("second.txt"), false).unwrap();
        assert!(exists);
        assert_eq!(path, root.join("second.txt"));
    }
}
