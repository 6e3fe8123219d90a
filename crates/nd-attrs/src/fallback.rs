//! Platforms without native flags or extended attributes.

use nd_dos::{msg2err, Error};
use std::path::Path;

pub fn native_probe(_path: &Path) -> bool {
    false
}

pub fn native_get(path: &Path) -> Result<u8, Error> {
    Err(msg2err!(format!("native DOS attributes are not supported for {path:?}")))
}

pub fn native_set(path: &Path, _attrs: u8) -> Result<(), Error> {
    Err(msg2err!(format!("native DOS attributes are not supported for {path:?}")))
}

pub fn xattr_probe(_path: &Path) -> bool {
    false
}

pub fn xattr_get(path: &Path) -> Result<Option<u8>, Error> {
    Err(msg2err!(format!("extended attributes are not supported for {path:?}")))
}

pub fn xattr_set(path: &Path, _attrs: u8) -> Result<(), Error> {
    Err(msg2err!(format!("extended attributes are not supported for {path:?}")))
}

pub fn xattr_remove(path: &Path) -> Result<(), Error> {
    Err(msg2err!(format!("extended attributes are not supported for {path:?}")))
}
