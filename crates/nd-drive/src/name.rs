//! 8.3 name synthesis.

use nd_dos::fcb::FcbName;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

/// DOS-legal punctuation that passes through unchanged.
const ALLOWED_SPECIAL: &[u8] = b"!#$%&'()-@^_`{}~";

/// Uppercase the input and strip illegal characters into `out`.
///
/// Interior spaces are part of the name, trailing spaces are padding.
/// Returns the used length and whether anything was dropped.
fn sanitize(input: &[u8], out: &mut [u8]) -> (usize, bool) {
    let last_non_space = input.iter().rposition(|&c| c != b' ').unwrap_or(usize::MAX);

    let mut shortened = false;
    let mut len = 0;
    for (idx, &ch) in input.iter().enumerate() {
        if len == out.len() {
            return (len, true);
        }
        if ch.is_ascii_uppercase() || ch.is_ascii_digit() || ALLOWED_SPECIAL.contains(&ch) {
            out[len] = ch;
            len += 1;
        } else if ch.is_ascii_lowercase() {
            out[len] = ch.to_ascii_uppercase();
            len += 1;
        } else if ch == b' ' && idx < last_non_space {
            out[len] = ch;
            len += 1;
        } else {
            shortened = true;
        }
    }

    for b in out[len..].iter_mut() {
        *b = b' ';
    }
    (len, shortened)
}

/// Fold a native file name into an FCB name unique within its listing.
///
/// The name splits at the last dot. A sanitized name that lost nothing
/// and is new to the witness set is used as is; everything else gets a
/// `~N` tail with the first free N. More than 9999 collisions fail the
/// entry.
pub(crate) fn file_name_to_83(long_name: &OsStr, fcb_name: &mut FcbName, used_names: &mut BTreeSet<FcbName>) -> bool {
    let bytes = long_name.as_bytes();
    let (base, ext) = match bytes.iter().rposition(|&c| c == b'.') {
        Some(dot) => (&bytes[..dot], &bytes[dot + 1..]),
        None => (bytes, &bytes[..0]),
    };

    let (mut base_len, base_shortened) = sanitize(base, &mut fcb_name.base);
    let (_ext_len, ext_shortened) = sanitize(ext, &mut fcb_name.ext);

    if !base_shortened && !ext_shortened && used_names.insert(*fcb_name) {
        return true;
    }

    // add a suffix number
    for counter in 1..=9999u32 {
        let digits = match counter {
            c if c > 999 => 4,
            c if c > 99 => 3,
            c if c > 9 => 2,
            _ => 1,
        };
        if base_len + 1 + digits > fcb_name.base.len() {
            base_len = fcb_name.base.len() - 1 - digits;
        }
        fcb_name.base[base_len] = b'~';
        let text = counter.to_string();
        fcb_name.base[base_len + 1..base_len + 1 + digits].copy_from_slice(text.as_bytes());

        if used_names.insert(*fcb_name) {
            return true;
        }
    }

    // more than 9999 names with the same prefix
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_83(name: &str, used: &mut BTreeSet<FcbName>) -> FcbName {
        let mut fcb = FcbName::EMPTY;
        assert!(file_name_to_83(OsStr::new(name), &mut fcb, used));
        fcb
    }

    #[test]
    fn plain_names_pass_through() {
        let mut used = BTreeSet::new();
        let fcb = to_83("README.TXT", &mut used);
        assert_eq!(&fcb.base, b"README  ");
        assert_eq!(&fcb.ext, b"TXT");
        // lower case folds without being marked shortened
        let fcb = to_83("notes.txt", &mut used);
        assert_eq!(&fcb.base, b"NOTES   ");
    }

    #[test]
    fn accents_are_dropped() {
        let mut used = BTreeSet::new();
        let fcb = to_83("résumé.txt", &mut used);
        assert_eq!(&fcb.base, b"RSUM~1  ");
        assert_eq!(&fcb.ext, b"TXT");
    }

    #[test]
    fn long_names_get_a_tail() {
        let mut used = BTreeSet::new();
        let fcb = to_83("longfilename.txt", &mut used);
        assert_eq!(&fcb.base, b"LONGFI~1");
        let fcb = to_83("longfilename2.txt", &mut used);
        assert_eq!(&fcb.base, b"LONGFI~2");
    }

    #[test]
    fn collisions_count_up() {
        let mut used = BTreeSet::new();
        assert_eq!(&to_83("a b.txt", &mut used).base, b"A B     ");
        // the same folded name collides with the witness set
        assert_eq!(&to_83("A b.txt", &mut used).base, b"A B~1   ");
        assert_eq!(&to_83("a B.txt", &mut used).base, b"A B~2   ");
        // a different extension still collides on the base
        assert_eq!(&to_83("a b.doc", &mut used).base, b"A B     ");
    }

    #[test]
    fn tail_grows_with_the_counter() {
        let mut used = BTreeSet::new();
        // occupy ~1 .. ~10 for the same stem
        for n in 1..=10 {
            let fcb = to_83("verylongname+.txt", &mut used);
            if n < 10 {
                assert_eq!(fcb.base[6], b'~', "{n}");
            } else {
                // two digits steal one more base character
                assert_eq!(&fcb.base, b"VERYL~10");
            }
        }
    }

    #[test]
    fn allowed_punctuation_survives() {
        let mut used = BTreeSet::new();
        let fcb = to_83("a#b$c(d).x_z", &mut used);
        assert_eq!(&fcb.base, b"A#B$C(D)");
        assert_eq!(&fcb.ext, b"X_Z");
    }

    #[test]
    fn dotfiles_have_an_empty_base() {
        let mut used = BTreeSet::new();
        let fcb = to_83(".profile", &mut used);
        // the extension is truncated, so the whole name counts as shortened
        assert_eq!(&fcb.base, b"~1      ");
        assert_eq!(&fcb.ext, b"PRO");
    }
}
