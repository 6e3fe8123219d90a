//! DOS extended error codes reported in the reply `ax` field.

pub const NO_ERROR: u16 = 0;
pub const FILE_NOT_FOUND: u16 = 2;
pub const PATH_NOT_FOUND: u16 = 3;
pub const ACCESS_DENIED: u16 = 5;
pub const NO_MORE_FILES: u16 = 18;
pub const WRITE_FAULT: u16 = 29;
