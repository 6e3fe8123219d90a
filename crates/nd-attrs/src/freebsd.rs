//! FreeBSD backends: BSD file flags and user extattrs.

use crate::cpath;
use nd_dos::attr::{FAT_ARCHIVE, FAT_HIDDEN, FAT_NONE, FAT_RO, FAT_SYSTEM};
use nd_dos::{msg2err, Error};
use std::path::Path;
use tracing::debug;

// from sys/stat.h
const UF_SYSTEM: u32 = 0x0000_0080;
const UF_ARCHIVE: u32 = 0x0000_0800;
const UF_READONLY: u32 = 0x0000_1000;
const UF_HIDDEN: u32 = 0x0000_8000;

const EA_NAME: &[u8] = b"NetMountAttrs\0";

pub fn native_probe(path: &Path) -> bool {
    let Ok(cpath) = cpath(path) else {
        return false;
    };
    let mut buf: libc::statfs = unsafe { core::mem::zeroed() };
    if unsafe { libc::statfs(cpath.as_ptr(), &mut buf) } == -1 {
        debug!("statfs on {path:?}: {}", std::io::Error::last_os_error());
        return false;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(buf.f_fstypename.as_ptr()) };
    name.to_bytes() == b"msdosfs"
}

fn stat_flags(path: &Path) -> Result<u32, Error> {
    let cpath = cpath(path)?;
    let mut statbuf: libc::stat = unsafe { core::mem::zeroed() };
    if unsafe { libc::stat(cpath.as_ptr(), &mut statbuf) } == -1 {
        return Err(msg2err!(format!(
            "failed to fetch attributes of {path:?}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(statbuf.st_flags)
}

pub fn native_get(path: &Path) -> Result<u8, Error> {
    let flags = stat_flags(path)?;
    let mut attrs = FAT_NONE;
    if flags & UF_READONLY != 0 {
        attrs |= FAT_RO;
    }
    if flags & UF_HIDDEN != 0 {
        attrs |= FAT_HIDDEN;
    }
    if flags & UF_SYSTEM != 0 {
        attrs |= FAT_SYSTEM;
    }
    if flags & UF_ARCHIVE != 0 {
        attrs |= FAT_ARCHIVE;
    }
    Ok(attrs)
}

pub fn native_set(path: &Path, attrs: u8) -> Result<(), Error> {
    let mut flags: libc::c_ulong = 0;
    if attrs & FAT_RO != 0 {
        flags |= UF_READONLY as libc::c_ulong;
    }
    if attrs & FAT_HIDDEN != 0 {
        flags |= UF_HIDDEN as libc::c_ulong;
    }
    if attrs & FAT_SYSTEM != 0 {
        flags |= UF_SYSTEM as libc::c_ulong;
    }
    if attrs & FAT_ARCHIVE != 0 {
        flags |= UF_ARCHIVE as libc::c_ulong;
    }

    let cpath = cpath(path)?;
    if unsafe { libc::chflags(cpath.as_ptr(), flags) } == -1 {
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
        libc::extattr_get_file(
            cpath.as_ptr(),
            libc::EXTATTR_NAMESPACE_USER,
            EA_NAME.as_ptr() as *const libc::c_char,
            std::ptr::null_mut(),
            0,
        )
    };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOATTR) {
            return true;
        }
        debug!("extattr probe on {path:?}: {err}");
        return false;
    }
    true
}

pub fn xattr_get(path: &Path) -> Result<Option<u8>, Error> {
    let cpath = cpath(path)?;
    let mut attrs = [0u8; 8];
    let ret = unsafe {
        libc::extattr_get_file(
            cpath.as_ptr(),
            libc::EXTATTR_NAMESPACE_USER,
            EA_NAME.as_ptr() as *const libc::c_char,
            attrs.as_mut_ptr() as *mut libc::c_void,
            attrs.len(),
        )
    };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOATTR) {
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
        libc::extattr_set_file(
            cpath.as_ptr(),
            libc::EXTATTR_NAMESPACE_USER,
            EA_NAME.as_ptr() as *const libc::c_char,
            &attrs as *const u8 as *const libc::c_void,
            1,
        )
    };
    if ret < 0 {
        return Err(msg2err!(format!(
            "failed to set attributes of {path:?}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

pub fn xattr_remove(path: &Path) -> Result<(), Error> {
    let cpath = cpath(path)?;
    let ret = unsafe {
        libc::extattr_delete_file(
            cpath.as_ptr(),
            libc::EXTATTR_NAMESPACE_USER,
            EA_NAME.as_ptr() as *const libc::c_char,
        )
    };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOATTR) {
            return Ok(());
        }
        return Err(msg2err!(format!("failed to remove attributes of {path:?}: {err}")));
    }
    Ok(())
}
