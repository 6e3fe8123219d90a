//! Fixed-offset request and reply bodies.
//!
//! Every body is a packed little-endian record directly after the
//! header. Requests parse from the received bytes; replies emit into
//! the reply buffer and return their length.

use nd_dos::fcb::{FcbName, FCB_LEN};
use nd_dos::wire;

/// CLOSE_FILE carries the handle in the start-cluster field.
pub struct CloseReq {
    pub handle: u16,
}

impl CloseReq {
    pub const LEN: usize = 2;

    pub fn parse(body: &[u8]) -> Option<Self> {
        (body.len() == Self::LEN).then(|| Self {
            handle: wire::get16(body, 0),
        })
    }
}

/// LOCK_UNLOCK_FILE request; the parameter list behind it is ignored.
pub struct LockReq {
    pub params_count: u16,
    pub handle: u16,
}

impl LockReq {
    pub const LEN: usize = 4;

    pub fn parse(body: &[u8]) -> Option<Self> {
        (body.len() >= Self::LEN).then(|| Self {
            params_count: wire::get16(body, 0),
            handle: wire::get16(body, 2),
        })
    }
}

/// READ_FILE request.
pub struct ReadReq {
    pub offset: u32,
    pub handle: u16,
    pub length: u16,
}

impl ReadReq {
    pub const LEN: usize = 8;

    pub fn parse(body: &[u8]) -> Option<Self> {
        (body.len() == Self::LEN).then(|| Self {
            offset: wire::get32(body, 0),
            handle: wire::get16(body, 4),
            length: wire::get16(body, 6),
        })
    }
}

/// WRITE_FILE request; the payload follows the fixed part.
pub struct WriteReq {
    pub offset: u32,
    pub handle: u16,
}

impl WriteReq {
    pub const LEN: usize = 6;

    pub fn parse(body: &[u8]) -> Option<(Self, &[u8])> {
        (body.len() >= Self::LEN).then(|| {
            (
                Self {
                    offset: wire::get32(body, 0),
                    handle: wire::get16(body, 4),
                },
                &body[Self::LEN..],
            )
        })
    }
}

/// WRITE_FILE reply.
pub struct WriteReply {
    pub written: u16,
}

impl WriteReply {
    pub const LEN: usize = 2;

    pub fn emit(&self, out: &mut [u8]) -> usize {
        wire::put16(out, 0, self.written);
        Self::LEN
    }
}

/// DISK_INFO reply. The cluster size is carried in `bytes_per_sector`.
pub struct DiskInfoReply {
    pub total_clusters: u16,
    pub bytes_per_sector: u16,
    pub available_clusters: u16,
}

impl DiskInfoReply {
    pub const LEN: usize = 6;

    pub fn emit(&self, out: &mut [u8]) -> usize {
        wire::put16(out, 0, self.total_clusters);
        wire::put16(out, 2, self.bytes_per_sector);
        wire::put16(out, 4, self.available_clusters);
        Self::LEN
    }
}

/// GET_ATTRS reply.
pub struct GetAttrsReply {
    pub time: u16,
    pub date: u16,
    pub size_lo: u16,
    pub size_hi: u16,
    pub attrs: u8,
}

impl GetAttrsReply {
    pub const LEN: usize = 9;

    pub fn emit(&self, out: &mut [u8]) -> usize {
        wire::put16(out, 0, self.time);
        wire::put16(out, 2, self.date);
        wire::put16(out, 4, self.size_lo);
        wire::put16(out, 6, self.size_hi);
        out[8] = self.attrs;
        Self::LEN
    }
}

/// FIND_NEXT request with the FCB search template.
pub struct FindNextReq {
    pub handle: u16,
    pub dir_entry: u16,
    pub attrs: u8,
    pub mask: FcbName,
}

impl FindNextReq {
    pub const LEN: usize = 5 + FCB_LEN;

    pub fn parse(body: &[u8]) -> Option<Self> {
        (body.len() == Self::LEN).then(|| {
            let mut raw = [0u8; FCB_LEN];
            raw.copy_from_slice(&body[5..]);
            Self {
                handle: wire::get16(body, 0),
                dir_entry: wire::get16(body, 2),
                attrs: body[4],
                mask: FcbName::from_bytes(&raw),
            }
        })
    }
}

/// FIND_FIRST and FIND_NEXT reply. The handle travels as the DOS
/// start-cluster field.
pub struct FindReply {
    pub attrs: u8,
    pub name: FcbName,
    pub time: u16,
    pub date: u16,
    pub size: u32,
    pub start_cluster: u16,
    pub dir_entry: u16,
}

impl FindReply {
    pub const LEN: usize = 12 + FCB_LEN;

    pub fn emit(&self, out: &mut [u8]) -> usize {
        out[0] = self.attrs;
        out[1..1 + FCB_LEN].copy_from_slice(&self.name.to_bytes());
        wire::put16(out, 12, self.time);
        wire::put16(out, 14, self.date);
        wire::put32(out, 16, self.size);
        wire::put16(out, 20, self.start_cluster);
        wire::put16(out, 22, self.dir_entry);
        Self::LEN
    }
}

/// SEEK_FROM_END request: a negative offset from the end of the file.
pub struct SeekReq {
    pub offset_lo: u16,
    pub offset_hi: u16,
    pub handle: u16,
}

impl SeekReq {
    pub const LEN: usize = 6;

    pub fn parse(body: &[u8]) -> Option<Self> {
        (body.len() == Self::LEN).then(|| Self {
            offset_lo: wire::get16(body, 0),
            offset_hi: wire::get16(body, 2),
            handle: wire::get16(body, 4),
        })
    }
}

/// SEEK_FROM_END reply: the resulting offset from the file start.
pub struct SeekReply {
    pub position_lo: u16,
    pub position_hi: u16,
}

impl SeekReply {
    pub const LEN: usize = 4;

    pub fn emit(&self, out: &mut [u8]) -> usize {
        wire::put16(out, 0, self.position_lo);
        wire::put16(out, 2, self.position_hi);
        Self::LEN
    }
}

/// OPEN_FILE, CREATE_FILE and EXTENDED_OPEN_CREATE request; the path
/// follows the fixed part.
pub struct OpenCreateReq {
    pub attrs: u16,
    pub action: u16,
    pub mode: u16,
}

impl OpenCreateReq {
    pub const LEN: usize = 6;

    pub fn parse(body: &[u8]) -> Option<(Self, &[u8])> {
        (body.len() > Self::LEN).then(|| {
            (
                Self {
                    attrs: wire::get16(body, 0),
                    action: wire::get16(body, 2),
                    mode: wire::get16(body, 4),
                },
                &body[Self::LEN..],
            )
        })
    }
}

/// OPEN_FILE, CREATE_FILE and EXTENDED_OPEN_CREATE reply.
pub struct OpenCreateReply {
    pub attrs: u8,
    pub name: FcbName,
    pub date_time: u32,
    pub size: u32,
    pub start_cluster: u16,
    /// Only meaningful for EXTENDED_OPEN_CREATE.
    pub result_code: u16,
    pub mode: u8,
}

impl OpenCreateReply {
    pub const LEN: usize = 14 + FCB_LEN;

    pub fn emit(&self, out: &mut [u8]) -> usize {
        out[0] = self.attrs;
        out[1..1 + FCB_LEN].copy_from_slice(&self.name.to_bytes());
        wire::put32(out, 12, self.date_time);
        wire::put32(out, 16, self.size);
        wire::put16(out, 20, self.start_cluster);
        wire::put16(out, 22, self.result_code);
        out[24] = self.mode;
        Self::LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_req_exact_length() {
        let mut body = [0u8; ReadReq::LEN];
        wire::put32(&mut body, 0, 0x11223344);
        wire::put16(&mut body, 4, 7);
        wire::put16(&mut body, 6, 512);
        let req = ReadReq::parse(&body).unwrap();
        assert_eq!(req.offset, 0x11223344);
        assert_eq!(req.handle, 7);
        assert_eq!(req.length, 512);
        assert!(ReadReq::parse(&body[..7]).is_none());
    }

    #[test]
    fn write_req_splits_payload() {
        let mut body = vec![0u8; WriteReq::LEN];
        wire::put32(&mut body, 0, 100);
        wire::put16(&mut body, 4, 3);
        body.extend_from_slice(b"hello");
        let (req, data) = WriteReq::parse(&body).unwrap();
        assert_eq!(req.offset, 100);
        assert_eq!(req.handle, 3);
        assert_eq!(data, b"hello");
    }

    #[test]
    fn find_reply_layout() {
        let reply = FindReply {
            attrs: 0x20,
            name: FcbName::from_short_name(b"readme.txt"),
            time: 0x1883,
            date: 0x5a22,
            size: 123,
            start_cluster: 2,
            dir_entry: 5,
        };
        let mut out = [0u8; FindReply::LEN];
        assert_eq!(reply.emit(&mut out), FindReply::LEN);
        assert_eq!(out[0], 0x20);
        assert_eq!(&out[1..12], b"README  TXT");
        assert_eq!(wire::get16(&out, 20), 2);
        assert_eq!(wire::get16(&out, 22), 5);
    }

    #[test]
    fn open_create_needs_path() {
        let body = [0u8; OpenCreateReq::LEN];
        assert!(OpenCreateReq::parse(&body).is_none());
        let mut body = body.to_vec();
        body.push(b'x');
        let (_, path) = OpenCreateReq::parse(&body).unwrap();
        assert_eq!(path, b"x");
    }
}
