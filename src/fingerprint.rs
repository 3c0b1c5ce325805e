//! Content digests and the 16-byte prefix tag.
//!
//! Two fingerprints per file:
//!
//! - **Full digest** (`hash_file`): streaming digest of the whole content,
//!   optionally capped at `max_read` cumulative bytes. This is the
//!   duplicate-equivalence key.
//! - **Prefix tag** (`first_16b`): a cheap 16-byte mash of the first 64
//!   bytes. Non-cryptographic, used only as a negative identity filter
//!   when deciding whether a renamed file must be re-hashed.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};

use camino::Utf8Path;
use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::{xxh3_64_with_seed, Xxh3};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Content-digest registry. SHA-256 is the default; the legacy configured
/// name `md5` is accepted as an alias for it. `py`/`python` select a weak
/// rolling hash kept only for debugging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Xxh3,
    Rolling,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" | "md5" => Some(HashAlgorithm::Sha256),
            "xxh3" | "xxhash" => Some(HashAlgorithm::Xxh3),
            "py" | "python" => Some(HashAlgorithm::Rolling),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Xxh3 => "xxh3",
            HashAlgorithm::Rolling => "rolling",
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

enum DigestState {
    Sha256(Box<Sha256>),
    Xxh3(Box<Xxh3>),
    Rolling(u64),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => DigestState::Sha256(Box::new(Sha256::new())),
            HashAlgorithm::Xxh3 => DigestState::Xxh3(Box::new(Xxh3::new())),
            HashAlgorithm::Rolling => DigestState::Rolling(0),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            DigestState::Sha256(h) => h.update(chunk),
            DigestState::Xxh3(h) => h.update(chunk),
            DigestState::Rolling(value) => *value = xxh3_64_with_seed(chunk, *value),
        }
    }

    fn finish(self) -> String {
        match self {
            DigestState::Sha256(h) => to_hex(h.finalize().as_slice()),
            DigestState::Xxh3(h) => format!("{:032x}", h.digest128()),
            DigestState::Rolling(value) => format!("{value:016x}"),
        }
    }
}

/// Digest a file's content in `chunk_size` reads, stopping once `max_read`
/// cumulative bytes have been fed (cap granularity is one chunk). Returns
/// the lowercase hex digest.
pub fn hash_file(
    path: &Utf8Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
    max_read: Option<u64>,
) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut state = DigestState::new(algorithm);
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total_read: u64 = 0;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        state.update(&buf[..n]);
        total_read += n as u64;
        if matches!(max_read, Some(cap) if total_read >= cap) {
            break;
        }
    }

    Ok(state.finish())
}

/// The 16-byte prefix tag: the first 64 bytes are split into four 16-byte
/// chunks (zero-padded), and output byte `i` is the XOR over chunks `j` of
/// `chunk[j][i]` rotated left by `(i + j) mod 8` bits. Deterministic,
/// endian-independent, and dependent only on the first 64 bytes.
pub fn first_16b(path: &Utf8Path) -> io::Result<String> {
    let mut head = [0u8; 64];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let mut tag = [0u8; 16];
    for (i, out) in tag.iter_mut().enumerate() {
        for j in 0..4 {
            let rot = ((i + j) % 8) as u32;
            *out ^= head[j * 16 + i].rotate_left(rot);
        }
    }
    Ok(to_hex(&tag))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;

    fn write_temp(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(HashAlgorithm::parse("sha256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("SHA-256"), Some(HashAlgorithm::Sha256));
        // Legacy configured name maps to the default digest.
        assert_eq!(HashAlgorithm::parse("md5"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("xxh3"), Some(HashAlgorithm::Xxh3));
        assert_eq!(HashAlgorithm::parse("py"), Some(HashAlgorithm::Rolling));
        assert_eq!(HashAlgorithm::parse("python"), Some(HashAlgorithm::Rolling));
        assert_eq!(HashAlgorithm::parse("crc64"), None);
    }

    #[test]
    fn sha256_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "hello.txt", b"hello");
        let digest = hash_file(&path, HashAlgorithm::Sha256, DEFAULT_CHUNK_SIZE, None).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn chunked_read_matches_single_read() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let path = write_temp(&dir, "big.bin", &content);
        let whole = hash_file(&path, HashAlgorithm::Sha256, DEFAULT_CHUNK_SIZE, None).unwrap();
        let chunked = hash_file(&path, HashAlgorithm::Sha256, 7, None).unwrap();
        assert_eq!(whole, chunked);
    }

    #[test]
    fn max_read_caps_at_chunk_granularity() {
        let dir = tempfile::tempdir().unwrap();
        let full = write_temp(&dir, "full.bin", b"abcdefgh");
        let head = write_temp(&dir, "head.bin", b"abcd");
        let capped = hash_file(&full, HashAlgorithm::Sha256, 4, Some(4)).unwrap();
        let expected = hash_file(&head, HashAlgorithm::Sha256, 4, None).unwrap();
        assert_eq!(capped, expected);
    }

    #[test]
    fn xxh3_and_rolling_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "data.bin", b"some data worth hashing");
        for algorithm in [HashAlgorithm::Xxh3, HashAlgorithm::Rolling] {
            let a = hash_file(&path, algorithm, 8, None).unwrap();
            let b = hash_file(&path, algorithm, 8, None).unwrap();
            assert_eq!(a, b);
            assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        }
        let x = hash_file(&path, HashAlgorithm::Xxh3, 8, None).unwrap();
        assert_eq!(x.len(), 32);
    }

    #[test]
    fn first_16b_of_empty_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "empty", b"");
        assert_eq!(first_16b(&path).unwrap(), "0".repeat(32));
    }

    #[test]
    fn first_16b_single_byte_positions() {
        let dir = tempfile::tempdir().unwrap();

        // Byte 0x01 at offset 0: chunk 0, i=0, rotation 0 -> output[0] = 0x01.
        let path = write_temp(&dir, "a", &[0x01]);
        assert_eq!(
            first_16b(&path).unwrap(),
            format!("01{}", "0".repeat(30))
        );

        // Byte 0x80 at offset 1: chunk 0, i=1, rotation 1 -> output[1] = 0x01.
        let path = write_temp(&dir, "b", &[0x00, 0x80]);
        assert_eq!(
            first_16b(&path).unwrap(),
            format!("0001{}", "0".repeat(28))
        );

        // Byte 0x80 at offset 16: chunk 1, i=0, rotation 1 -> output[0] = 0x01.
        let mut content = vec![0u8; 17];
        content[16] = 0x80;
        let path = write_temp(&dir, "c", &content);
        assert_eq!(
            first_16b(&path).unwrap(),
            format!("01{}", "0".repeat(30))
        );
    }

    #[test]
    fn first_16b_depends_only_on_first_64_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = vec![0xAB; 100];
        let mut b = vec![0xAB; 200];
        a[70] = 0x01;
        b[70] = 0x02;
        let pa = write_temp(&dir, "a.bin", &a);
        let pb = write_temp(&dir, "b.bin", &b);
        assert_eq!(first_16b(&pa).unwrap(), first_16b(&pb).unwrap());

        let mut c = a.clone();
        c[3] = 0x00;
        let pc = write_temp(&dir, "c.bin", &c);
        assert_ne!(first_16b(&pa).unwrap(), first_16b(&pc).unwrap());
    }

    #[test]
    fn first_16b_is_32_lowercase_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "x", b"The quick brown fox jumps over the lazy dog");
        let tag = first_16b(&path).unwrap();
        assert_eq!(tag.len(), 32);
        assert!(tag
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
