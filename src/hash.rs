//! Stable content checksums.
//!
//! Hashes are combined with wrapping addition: the combination is
//! associative and commutative, so callers can fold an unordered set of
//! dependency hashes (e.g. module dependencies, kernel dependencies) with
//! `+` and get a result independent of iteration order.

use crate::error::Result;
use std::fs;
use std::path::Path;

/// CRC32 checksum of a file's bytes.
pub fn file_hash(path: impl AsRef<Path>) -> Result<u32> {
    let bytes = fs::read(path.as_ref())?;
    Ok(crc32fast::hash(&bytes))
}

/// CRC32 checksum of a string's UTF-8 bytes.
pub fn string_hash(s: &str) -> u32 {
    crc32fast::hash(s.as_bytes())
}

/// Combine any number of hashes into one. Defined as wrapping sum mod 2^32
/// so that reordering (e.g. of a `HashSet` of module dependency hashes)
/// never changes the result.
pub fn combine(hashes: impl IntoIterator<Item = u32>) -> u32 {
    hashes.into_iter().fold(0u32, |acc, h| acc.wrapping_add(h))
}

/// Lowercase hex rendering of a combo hash, used as the prebuild filename
/// suffix.
pub fn hex(hash: u32) -> String {
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn combine_is_order_independent() {
        let a = string_hash("alpha");
        let b = string_hash("beta");
        let c = string_hash("gamma");
        assert_eq!(combine([a, b, c]), combine([c, a, b]));
        assert_eq!(combine([a, b]), combine([b, a]));
    }

    #[test]
    fn combine_empty_is_zero() {
        assert_eq!(combine([]), 0);
    }

    #[test]
    fn file_hash_matches_string_hash_of_contents() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"module foo\nend module foo\n").unwrap();
        f.flush().unwrap();

        let expect = string_hash("module foo\nend module foo\n");
        assert_eq!(file_hash(f.path()).unwrap(), expect);
    }

    #[test]
    fn changing_one_input_changes_the_combo() {
        let h1 = combine([1, 2, 3]);
        let h2 = combine([1, 2, 4]);
        assert_ne!(h1, h2);
    }
}
