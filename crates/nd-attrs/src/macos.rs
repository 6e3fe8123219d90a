//! macOS backends: no native FAT attributes, xattrs only.

use crate::cpath;
use nd_dos::{msg2err, Error};
use std::path::Path;
use tracing::debug;

const EA_NAME: &[u8] = b"user.NetMountAttrs\0";

pub fn native_probe(_path: &Path) -> bool {
    false
}

pub fn native_get(path: &Path) -> Result<u8, Error> {
    Err(msg2err!(format!("native DOS attributes are not supported for {path:?}")))
}

pub fn native_set(path: &Path, _attrs: u8) -> Result<(), Error> {
    Err(msg2err!(format!("native DOS attributes are not supported for {path:?}")))
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
            0,
            0,
        )
    };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOATTR) {
            return true;
        }
        debug!("xattr probe on {path:?}: {err}");
        return false;
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
            0,
            0,
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
        libc::setxattr(
            cpath.as_ptr(),
            EA_NAME.as_ptr() as *const libc::c_char,
            &attrs as *const u8 as *const libc::c_void,
            1,
            0,
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
    let ret = unsafe { libc::removexattr(cpath.as_ptr(), EA_NAME.as_ptr() as *const libc::c_char, 0) };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOATTR) {
            return Ok(());
        }
        return Err(msg2err!(format!("failed to remove attributes of {path:?}: {err}")));
    }
    Ok(())
}
