//! The request dispatcher.
//!
//! The reply header starts as a copy of the request header with `ax`
//! set to NO_ERROR; each handler fills an optional body and may
//! overwrite `ax` with a DOS extended error code. A `None` means the
//! datagram is dropped without an answer.

use nd_dos::attr::{FAT_DIRECTORY, FAT_VOLUME};
use nd_dos::exterr;
use nd_dos::fcb::FcbName;
use nd_drive::{Drive, Drives, DosFileProperties};
use nd_proto::body::{
    CloseReq, DiskInfoReply, FindNextReq, FindReply, GetAttrsReply, LockReq, OpenCreateReq, OpenCreateReply, ReadReq,
    SeekReply, SeekReq, WriteReply, WriteReq,
};
use nd_proto::{action, func, open_result, Header, HEADER_LEN};
use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Lowercase a wire path and turn it into a relative `/` path.
fn client_path(raw: &[u8]) -> PathBuf {
    let mut bytes: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'\\' { b'/' } else { b.to_ascii_lowercase() })
        .collect();
    while bytes.first() == Some(&b'/') {
        bytes.remove(0);
    }
    PathBuf::from(OsString::from_vec(bytes))
}

/// Shape a FIND_FIRST / FIND_NEXT reply.
fn emit_find_reply(out: &mut [u8], handle: u16, nth: u16, props: &DosFileProperties) -> usize {
    FindReply {
        attrs: props.attrs,
        name: props.fcb_name,
        time: props.time_date as u16,
        date: (props.time_date >> 16) as u16,
        size: props.size,
        start_cluster: handle,
        dir_entry: nth,
    }
    .emit(out)
}

/// Dispatch one validated request into the reply buffer.
///
/// Returns the total reply length including the header, or `None` to
/// drop the datagram. The caller finalizes length and checksum.
pub(crate) fn process_request(drives: &mut Drives, reply: &mut [u8], request: &[u8]) -> Option<usize> {
    // the caller has already validated the header
    let header = Header::parse(request)?;
    let function = header.function;
    let drive_index = header.drive_index();
    let body = &request[HEADER_LEN..];

    // A and B are floppy letters the client handles locally
    if !(2..Drives::COUNT).contains(&drive_index) {
        warn!("request for invalid drive number {drive_index}");
        return None;
    }
    let letter = (b'A' + drive_index as u8) as char;
    let drive = drives.get_mut(drive_index);
    if !drive.is_shared() {
        warn!("request for drive {letter}: which is not shared");
        return None;
    }

    let mut ax = exterr::NO_ERROR;
    let reply_body = &mut reply[HEADER_LEN..];

    let body_len: usize = match function {
        func::MAKE_DIR | func::REMOVE_DIR => {
            if body.is_empty() {
                return None;
            }
            let path = client_path(body);
            if function == func::MAKE_DIR {
                debug!("MAKE_DIR \"{letter}:\\{}\"", path.display());
                if let Err(err) = drive.make_dir(&path) {
                    error!("MAKE_DIR \"{letter}:\\{}\": {err:#}", path.display());
                    ax = exterr::WRITE_FAULT;
                }
            } else {
                debug!("REMOVE_DIR \"{letter}:\\{}\"", path.display());
                if let Err(err) = drive.delete_dir(&path) {
                    error!("REMOVE_DIR \"{letter}:\\{}\": {err:#}", path.display());
                    ax = exterr::WRITE_FAULT;
                }
            }
            0
        }

        func::CHANGE_DIR => {
            if body.is_empty() {
                return None;
            }
            let path = client_path(body);
            debug!("CHANGE_DIR \"{letter}:\\{}\"", path.display());
            if let Err(err) = drive.change_dir(&path) {
                error!("CHANGE_DIR \"{letter}:\\{}\": {err:#}", path.display());
                ax = exterr::PATH_NOT_FOUND;
            }
            0
        }

        func::CLOSE_FILE => {
            // only the handle is checked, no file is kept open
            let req = CloseReq::parse(body)?;
            debug!("CLOSE_FILE handle {}", req.handle);
            if let Err(err) = drive.handle_path(req.handle) {
                error!("CLOSE_FILE: {err:#}");
            }
            0
        }

        func::LOCK_UNLOCK_FILE => {
            // advisory only, nothing is enforced
            let req = LockReq::parse(body)?;
            debug!("LOCK_UNLOCK_FILE handle {} ({} ranges)", req.handle, req.params_count);
            if let Err(err) = drive.handle_path(req.handle) {
                error!("LOCK_UNLOCK_FILE: {err:#}");
            }
            0
        }

        func::READ_FILE => {
            let req = ReadReq::parse(body)?;
            debug!("READ_FILE handle {}, {} bytes, offset {}", req.handle, req.length, req.offset);
            // the reply must fit one datagram
            let length = (req.length as usize).min(reply_body.len());
            match drive.read_file(&mut reply_body[..length], req.handle, req.offset) {
                Ok(count) => count,
                Err(err) => {
                    error!("READ_FILE: {err:#}");
                    ax = exterr::ACCESS_DENIED;
                    0
                }
            }
        }

        func::WRITE_FILE => {
            let (req, data) = WriteReq::parse(body)?;
            debug!("WRITE_FILE handle {}, {} bytes, offset {}", req.handle, data.len(), req.offset);
            match drive.write_file(data, req.handle, req.offset) {
                Ok(written) => WriteReply {
                    written: written as u16,
                }
                .emit(reply_body),
                Err(err) => {
                    error!("WRITE_FILE: {err:#}");
                    ax = exterr::ACCESS_DENIED;
                    0
                }
            }
        }

        func::DISK_INFO => {
            debug!("DISK_INFO for drive {letter}:");
            match drive.space_info() {
                Ok((total, free)) => {
                    // MS-DOS is confused by sizes of 2 GiB and above
                    const LIMIT: u64 = 2 * 1024 * 1024 * 1024 - 1;
                    let total = total.min(LIMIT);
                    let free = free.min(LIMIT);
                    debug!("  total {} KiB, free {} KiB", total >> 10, free >> 10);
                    // AX carries media id and sectors per cluster; DOS only
                    // tolerates one sector per cluster, so the 32 KiB
                    // cluster travels in bytes_per_sector
                    ax = 1;
                    DiskInfoReply {
                        total_clusters: (total >> 15) as u16,
                        bytes_per_sector: 32768,
                        available_clusters: (free >> 15) as u16,
                    }
                    .emit(reply_body)
                }
                Err(err) => {
                    error!("DISK_INFO: {err:#}");
                    return None;
                }
            }
        }

        func::SET_ATTRS => {
            if body.len() <= 1 {
                return None;
            }
            let attrs = body[0];
            let path = client_path(&body[1..]);
            debug!("SET_ATTRS 0x{attrs:02X} on \"{letter}:\\{}\"", path.display());
            if let Err(err) = drive.set_attrs(&path, attrs) {
                error!("SET_ATTRS 0x{attrs:02X} on \"{letter}:\\{}\": {err:#}", path.display());
                ax = exterr::FILE_NOT_FOUND;
            }
            0
        }

        func::GET_ATTRS => {
            if body.is_empty() {
                return None;
            }
            let path = client_path(body);
            debug!("GET_ATTRS on \"{letter}:\\{}\"", path.display());
            match drive.dos_properties(&path) {
                Ok(Some(props)) => {
                    debug!("found {} bytes, attrs 0x{:02X}", props.size, props.attrs);
                    GetAttrsReply {
                        time: props.time_date as u16,
                        date: (props.time_date >> 16) as u16,
                        size_lo: props.size as u16,
                        size_hi: (props.size >> 16) as u16,
                        attrs: props.attrs,
                    }
                    .emit(reply_body)
                }
                _ => {
                    debug!("no file found");
                    ax = exterr::FILE_NOT_FOUND;
                    0
                }
            }
        }

        func::RENAME_FILE => {
            // two paths, the first with a one-byte length prefix
            if body.len() < 3 {
                return None;
            }
            let path1_len = body[0] as usize;
            if body.len() >= 1 + path1_len {
                let old_path = client_path(&body[1..1 + path1_len]);
                let new_path = client_path(&body[1 + path1_len..]);
                debug!(
                    "RENAME_FILE \"{letter}:\\{}\" -> \"{letter}:\\{}\"",
                    old_path.display(),
                    new_path.display()
                );
                if let Err(err) = drive.rename_file(&old_path, &new_path) {
                    error!(
                        "RENAME_FILE \"{letter}:\\{}\" -> \"{letter}:\\{}\": {err:#}",
                        old_path.display(),
                        new_path.display()
                    );
                    ax = exterr::ACCESS_DENIED;
                }
            } else {
                ax = exterr::FILE_NOT_FOUND;
            }
            0
        }

        func::DELETE_FILE => {
            if body.is_empty() {
                return None;
            }
            let path = client_path(body);
            debug!("DELETE_FILE \"{letter}:\\{}\"", path.display());
            if let Err(err) = drive.delete_files(&path) {
                error!("DELETE_FILE: {err}");
                ax = err.code();
            }
            0
        }

        func::FIND_FIRST => {
            if body.len() <= 1 {
                return None;
            }
            let search_attrs = body[0];
            let template = client_path(&body[1..]);
            let parent = template.parent().map(Path::to_path_buf).unwrap_or_default();
            let mask = FcbName::from_short_name(template.file_name().map(OsStrExt::as_bytes).unwrap_or_default());
            debug!(
                "FIND_FIRST in \"{letter}:\\{}\", mask {mask:?}, attrs 0x{search_attrs:02X}",
                parent.display()
            );

            let mut nth = 0u16;
            let found = match drive.server_path(&parent, false) {
                Ok((directory, true)) => {
                    let handle = drive.get_handle(&directory);
                    match drive.find_file(handle, &mask, search_attrs, &mut nth) {
                        Ok(Some(props)) => Some((handle, props)),
                        Ok(None) => None,
                        Err(err) => {
                            error!("FIND_FIRST: {err:#}");
                            None
                        }
                    }
                }
                Ok((directory, false)) => {
                    debug!("directory does not exist: {directory:?}");
                    None
                }
                Err(err) => {
                    error!("FIND_FIRST: {err:#}");
                    None
                }
            };
            match found {
                Some((handle, props)) => {
                    debug!("found {:?}, attrs 0x{:02X}", props.fcb_name, props.attrs);
                    emit_find_reply(reply_body, handle, nth, &props)
                }
                None => {
                    // a failing FIND_FIRST reports NO_MORE_FILES, known
                    // clients do not cope with FILE_NOT_FOUND here
                    debug!("no matching file found");
                    ax = exterr::NO_MORE_FILES;
                    0
                }
            }
        }

        func::FIND_NEXT => {
            let req = FindNextReq::parse(body)?;
            let mut nth = req.dir_entry;
            debug!(
                "FIND_NEXT at {nth} in dir handle {}, mask {:?}, attrs 0x{:02X}",
                req.handle, req.mask, req.attrs
            );
            match drive.find_file(req.handle, &req.mask, req.attrs, &mut nth) {
                Ok(Some(props)) => {
                    debug!("found {:?}, attrs 0x{:02X}", props.fcb_name, props.attrs);
                    emit_find_reply(reply_body, req.handle, nth, &props)
                }
                Ok(None) => {
                    debug!("no more matching files");
                    ax = exterr::NO_MORE_FILES;
                    0
                }
                Err(err) => {
                    error!("FIND_NEXT: {err:#}");
                    ax = exterr::NO_MORE_FILES;
                    0
                }
            }
        }

        func::SEEK_FROM_END => {
            let req = SeekReq::parse(body)?;
            // translate the offset from the end into one from the start
            let mut offset = (((req.offset_hi as u32) << 16) | req.offset_lo as u32) as i32;
            debug!("SEEK_FROM_END on handle {}, offset {offset}", req.handle);
            if offset > 0 {
                offset = 0;
            }
            match drive.file_size(req.handle) {
                Ok(size) => {
                    let position = (offset + size as i32).max(0);
                    debug!("handle {}, size {size}, new offset {position}", req.handle);
                    SeekReply {
                        position_lo: position as u16,
                        position_hi: (position >> 16) as u16,
                    }
                    .emit(reply_body)
                }
                Err(err) => {
                    debug!("SEEK_FROM_END: {err:#}");
                    ax = exterr::FILE_NOT_FOUND;
                    0
                }
            }
        }

        func::OPEN_FILE | func::CREATE_FILE | func::EXTENDED_OPEN_CREATE => {
            let (req, raw_path) = OpenCreateReq::parse(body)?;
            let path = client_path(raw_path);
            match open_create(drive, function, &req, &path, reply_body) {
                Ok(len) => len,
                Err(code) => {
                    ax = code;
                    0
                }
            }
        }

        _ => {
            warn!("unknown function 0x{function:02X}");
            return None;
        }
    };

    // the reply header is the request header with the result in ax
    Header { ax, ..header }.emit(reply);
    Some(HEADER_LEN + body_len)
}

/// OPEN is "does this file exist", CREATE is "create or truncate it",
/// EXTENDED_OPEN_CREATE combines both behind action codes.
fn open_create(
    drive: &mut Drive,
    function: u8,
    req: &OpenCreateReq,
    path: &Path,
    reply_body: &mut [u8],
) -> Result<usize, u16> {
    let (server_path, _exists) = drive.server_path(path, false).map_err(|err| {
        error!("OPEN/CREATE: {err:#}");
        exterr::FILE_NOT_FOUND
    })?;
    let directory = server_path.parent().unwrap_or_else(|| Path::new("/"));
    if !directory.is_dir() {
        error!("OPEN/CREATE: directory {directory:?} does not exist");
        return Err(exterr::PATH_NOT_FOUND);
    }

    let mut result_code = 0;
    let mode;
    let props = match function {
        func::OPEN_FILE => {
            debug!("OPEN_FILE {server_path:?}, attrs 0x{:04X}", req.attrs);
            // the attribute word carries the open mode here
            mode = req.attrs as u8;
            let props = drive.server_path_properties(&server_path).ok_or(exterr::FILE_NOT_FOUND)?;
            if props.attrs & (FAT_VOLUME | FAT_DIRECTORY) != 0 {
                error!("OPEN_FILE: {server_path:?} is a directory or a volume");
                return Err(exterr::FILE_NOT_FOUND);
            }
            props
        }

        func::CREATE_FILE => {
            debug!("CREATE_FILE {server_path:?}, attrs 0x{:04X}", req.attrs);
            mode = 2; // read/write
            create(drive, &server_path, path, req.attrs as u8)?
        }

        _ => {
            debug!(
                "EXTENDED_OPEN_CREATE {server_path:?}, attrs 0x{:04X}, action 0x{:04X}, mode 0x{:04X}",
                req.attrs, req.action, req.mode
            );
            // keep the low mode bits, that is what clients expect back
            mode = (req.mode & 0x7F) as u8;
            match drive.server_path_properties(&server_path) {
                None => {
                    if req.action & action::IF_NOT_EXIST_MASK == action::CREATE_IF_NOT_EXIST {
                        debug!("file does not exist -> create");
                        result_code = open_result::CREATED;
                        create(drive, &server_path, path, req.attrs as u8)?
                    } else {
                        debug!("file does not exist -> fail");
                        return Err(exterr::FILE_NOT_FOUND);
                    }
                }
                Some(props) if props.attrs & (FAT_VOLUME | FAT_DIRECTORY) != 0 => {
                    error!("EXTENDED_OPEN_CREATE: {server_path:?} is a directory or a volume");
                    return Err(exterr::FILE_NOT_FOUND);
                }
                Some(props) => match req.action & action::IF_EXIST_MASK {
                    action::OPEN_IF_EXIST => {
                        debug!("file exists -> open");
                        result_code = open_result::OPENED;
                        props
                    }
                    action::REPLACE_IF_EXIST => {
                        debug!("file exists -> truncate");
                        result_code = open_result::TRUNCATED;
                        create(drive, &server_path, path, req.attrs as u8)?
                    }
                    _ => {
                        debug!("file exists -> fail");
                        return Err(exterr::FILE_NOT_FOUND);
                    }
                },
            }
        }
    };

    let handle = drive.get_handle(&server_path);
    let fcb_name = FcbName::from_short_name(path.file_name().map(OsStrExt::as_bytes).unwrap_or_default());
    debug!(
        "file {server_path:?}, handle {handle}, size {}, attrs 0x{:02X}",
        props.size, props.attrs
    );
    Ok(OpenCreateReply {
        attrs: props.attrs,
        name: fcb_name,
        date_time: props.time_date,
        size: props.size,
        start_cluster: handle,
        result_code,
        mode,
    }
    .emit(reply_body))
}

/// Create or truncate plus the listing refresh that follows any change.
fn create(drive: &mut Drive, server_path: &Path, client_path: &Path, attrs: u8) -> Result<DosFileProperties, u16> {
    let props = drive.create_or_truncate(server_path, attrs).map_err(|err| {
        error!("create: {err:#}");
        exterr::FILE_NOT_FOUND
    })?;
    drive.refresh_listing(client_path);
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_paths_are_folded() {
        assert_eq!(client_path(br"SUB\DIR\FILE.TXT"), Path::new("sub/dir/file.txt"));
        assert_eq!(client_path(br"\README.TXT"), Path::new("readme.txt"));
        assert_eq!(client_path(b""), Path::new(""));
    }
}
