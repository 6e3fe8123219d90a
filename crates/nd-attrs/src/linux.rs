//! Linux backends: FAT ioctls and user-namespace xattrs.

use crate::cpath;
use nd_dos::attr::{FAT_ARCHIVE, FAT_HIDDEN, FAT_NONE, FAT_RO, FAT_SYSTEM};
use nd_dos::{msg2err, Error};
use std::path::Path;
use tracing::debug;

// from linux/msdos_fs.h
const FAT_IOCTL_GET_ATTRIBUTES: libc::c_ulong = 0x8004_7210;
const FAT_IOCTL_SET_ATTRIBUTES: libc::c_ulong = 0x4004_7211;
const ATTR_RO: u32 = 0x01;
const ATTR_HIDDEN: u32 = 0x02;
const ATTR_SYS: u32 = 0x04;
const ATTR_ARCH: u32 = 0x20;

const EA_NAME: &[u8] = b"user.NetMountAttrs\0";

/// An open file descriptor that closes itself.
struct Fd(libc::c_int);

impl Fd {
    fn open_ro(path: &Path) -> Result<Self, Error> {
        let cpath = cpath(path)?;
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) };
        if fd == -1 {
            return Err(msg2err!(format!(
                "cannot open {path:?}: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self(fd))
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

pub fn native_probe(path: &Path) -> bool {
    match native_get(path) {
        Ok(_) => true,
        Err(err) => {
            debug!("no native DOS attributes below {path:?}: {err:#}");
            false
        }
    }
}

pub fn native_get(path: &Path) -> Result<u8, Error> {
    let fd = Fd::open_ro(path)?;
    let mut fat_attrs: u32 = 0;
    let res = unsafe { libc::ioctl(fd.0, FAT_IOCTL_GET_ATTRIBUTES, &mut fat_attrs) };
    if res == -1 {
        return Err(msg2err!(format!(
            "failed to fetch attributes of {path:?}: {}",
            std::io::Error::last_os_error()
        )));
    }

    let mut attrs = FAT_NONE;
    if fat_attrs & ATTR_RO != 0 {
        attrs |= FAT_RO;
    }
    if fat_attrs & ATTR_HIDDEN != 0 {
        attrs |= FAT_HIDDEN;
    }
    if fat_attrs & ATTR_SYS != 0 {
        attrs |= FAT_SYSTEM;
    }
    if fat_attrs & ATTR_ARCH != 0 {
        attrs |= FAT_ARCHIVE;
    }
    Ok(attrs)
}

pub fn native_set(path: &Path, attrs: u8) -> Result<(), Error> {
    let mut fat_attrs: u32 = 0;
    if attrs & FAT_RO != 0 {
        fat_attrs |= ATTR_RO;
    }
    if attrs & FAT_HIDDEN != 0 {
        fat_attrs |= ATTR_HIDDEN;
    }
    if attrs & FAT_SYSTEM != 0 {
        fat_attrs |= ATTR_SYS;
    }
    if attrs & FAT_ARCHIVE != 0 {
        fat_attrs |= ATTR_ARCH;
    }

    let fd = Fd::open_ro(path)?;
    let res = unsafe { libc::ioctl(fd.0, FAT_IOCTL_SET_ATTRIBUTES, &fat_attrs) };
    if res == -1 {
        return Err(msg2err!(format!(
            "failed to set attributes of {path:?}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

pub fn xattr_probe(path: &Path) -> bool {
    let Ok(cpath) = cpath(path) else {
        return false;
    };
    let ret = unsafe {
        libc::getxattr(
            cpath.as_ptr(),
            EA_NAME.as_ptr() as *const libc::c_char,
            std::ptr::null_mut(),
            0,
        )
    };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        debug!("xattr probe on {path:?}: {err}");
        // only a filesystem without user xattrs disqualifies
        if err.raw_os_error() == Some(libc::ENOTSUP) {
            return false;
        }
    }
    true
}

pub fn xattr_get(path: &Path) -> Result<Option<u8>, Error> {
    let cpath = cpath(path)?;
    let mut attrs = [0u8; 8];
    let ret = unsafe {
        libc::getxattr(
            cpath.as_ptr(),
            EA_NAME.as_ptr() as *const libc::c_char,
            attrs.as_mut_ptr() as *mut libc::c_void,
            attrs.len(),
        )
    };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENODATA) {
            return Ok(None);
        }
        return Err(msg2err!(format!("failed to fetch attributes of {path:?}: {err}")));
    }
    if ret == 0 {
        return Ok(None);
    }
    Ok(Some(attrs[0]))
}

pub fn xattr_set(path: &Path, attrs: u8) -> Result<(), Error> {
    let cpath = cpath(path)?;
    let ret = unsafe {
        libc::setxattr(
            cpath.as_ptr(),
            EA_NAME.as_ptr() as *const libc::c_char,
            &attrs as *const u8 as *const libc::c_void,
            1,
            0,
        )
    };
    if ret == -1 {
        return Err(msg2err!(format!(
            "failed to set attributes of {path:?}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

pub fn xattr_remove(path: &Path) -> Result<(), Error> {
    let cpath = cpath(path)?;
    let ret = unsafe { libc::removexattr(cpath.as_ptr(), EA_NAME.as_ptr() as *const libc::c_char) };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENODATA) {
            return Ok(());
        }
        return Err(msg2err!(format!("failed to remove attributes of {path:?}: {err}")));
    }
    Ok(())
}
