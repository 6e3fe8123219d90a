//! 8.3 file names in FCB form.

/// A DOS FCB-style file name: blank-padded base and extension.
///
/// Comparison is byte-wise over the base, then the extension. The
/// derived ordering is what the per-listing witness sets rely on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FcbName {
    pub base: [u8; 8],
    pub ext: [u8; 3],
}

/// Size of an FCB name on the wire.
pub const FCB_LEN: usize = 11;

impl FcbName {
    /// The all-blank name.
    pub const EMPTY: Self = Self {
        base: [b' '; 8],
        ext: [b' '; 3],
    };

    /// Fold a short name into FCB form.
    ///
    /// The base ends at the first dot. Up to two leading dots are kept
    /// in the base field so the `.` and `..` entries survive folding.
    pub fn from_short_name(short: &[u8]) -> Self {
        let mut res = Self::EMPTY;
        let mut i = 0;
        let mut at = 0;
        while at < short.len() && short[at] == b'.' {
            res.base[i] = b'.';
            i += 1;
            at += 1;
            if i == 2 {
                break;
            }
        }
        while at < short.len() && short[at] != b'.' {
            res.base[i] = short[at].to_ascii_uppercase();
            i += 1;
            at += 1;
            if i == res.base.len() {
                break;
            }
        }

        // move past the base to the dot and skip it
        while at < short.len() && short[at] != b'.' {
            at += 1;
        }
        if at < short.len() {
            at += 1;
        }

        let mut i = 0;
        while at < short.len() && short[at] != b'.' {
            res.ext[i] = short[at].to_ascii_uppercase();
            i += 1;
            at += 1;
            if i == res.ext.len() {
                break;
            }
        }
        res
    }

    /// A volume label occupies all eleven bytes without a dot.
    pub fn from_label(label: &[u8]) -> Self {
        let mut res = Self::EMPTY;
        for (i, b) in label.iter().take(FCB_LEN).enumerate() {
            let b = b.to_ascii_uppercase();
            if i < 8 {
                res.base[i] = b;
            } else {
                res.ext[i - 8] = b;
            }
        }
        res
    }

    /// Test this name against a mask, ASCII case-insensitive.
    ///
    /// A `?` in the mask matches any single byte.
    pub fn matches(&self, mask: &FcbName) -> bool {
        for i in 0..self.base.len() {
            if self.base[i].to_ascii_uppercase() != mask.base[i].to_ascii_uppercase() && mask.base[i] != b'?' {
                return false;
            }
        }
        for i in 0..self.ext.len() {
            if self.ext[i].to_ascii_uppercase() != mask.ext[i].to_ascii_uppercase() && mask.ext[i] != b'?' {
                return false;
            }
        }
        true
    }

    /// The eleven raw bytes as sent on the wire.
    pub fn to_bytes(self) -> [u8; FCB_LEN] {
        let mut res = [0u8; FCB_LEN];
        res[..8].copy_from_slice(&self.base);
        res[8..].copy_from_slice(&self.ext);
        res
    }

    /// Rebuild a name from eleven wire bytes.
    pub fn from_bytes(raw: &[u8; FCB_LEN]) -> Self {
        let mut res = Self::EMPTY;
        res.base.copy_from_slice(&raw[..8]);
        res.ext.copy_from_slice(&raw[8..]);
        res
    }
}

impl Default for FcbName {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl core::fmt::Debug for FcbName {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(
            fmt,
            "FcbName('{}','{}')",
            core::str::from_utf8(&self.base).unwrap_or("?"),
            core::str::from_utf8(&self.ext).unwrap_or("?")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folding() {
        let name = FcbName::from_short_name(b"readme.txt");
        assert_eq!(&name.base, b"README  ");
        assert_eq!(&name.ext, b"TXT");
        // folding is idempotent on an already upper-case name
        assert_eq!(name, FcbName::from_short_name(b"README.TXT"));
    }

    #[test]
    fn folding_truncates() {
        let name = FcbName::from_short_name(b"longfilename.backup");
        assert_eq!(&name.base, b"LONGFILE");
        assert_eq!(&name.ext, b"BAC");
    }

    #[test]
    fn dot_entries() {
        assert_eq!(&FcbName::from_short_name(b".").base, b".       ");
        assert_eq!(&FcbName::from_short_name(b"..").base, b"..      ");
        assert_eq!(&FcbName::from_short_name(b"..").ext, b"   ");
    }

    #[test]
    fn mask_match() {
        let mask = FcbName::from_short_name(b"????????.txt");
        assert!(FcbName::from_short_name(b"readme.txt").matches(&mask));
        assert!(FcbName::from_short_name(b"a.TXT").matches(&mask));
        assert!(!FcbName::from_short_name(b"readme.doc").matches(&mask));

        let exact = FcbName::from_short_name(b"readme.txt");
        assert!(FcbName::from_short_name(b"README.TXT").matches(&exact));
        assert!(!FcbName::from_short_name(b"readme1.txt").matches(&exact));
    }

    #[test]
    fn ordering() {
        let a = FcbName::from_short_name(b"a");
        let b = FcbName::from_short_name(b"b");
        assert!(a < b);
        // same base, the extension decides
        let a1 = FcbName::from_short_name(b"a.1");
        assert!(a < a1);
    }

    #[test]
    fn wire_bytes() {
        let name = FcbName::from_short_name(b"io.sys");
        let raw = name.to_bytes();
        assert_eq!(&raw, b"IO      SYS");
        assert_eq!(FcbName::from_bytes(&raw), name);
    }

    #[test]
    fn label() {
        let label = FcbName::from_label(b"netdrive c");
        assert_eq!(&label.base, b"NETDRIVE");
        assert_eq!(&label.ext, b" C ");
    }
}
