use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const SAMPLE_LENGTH: usize = 1024; // 1KB
const SAMPLE_BASE: u64 = 1024;

/// Sparse content fingerprint. Samples 1KB blocks at `1024 << (2 * i)` for
/// `i = -1..=10` and stops at the first offset past the end of the file.
///
/// The negative step wraps to offset 0 (32-bit shift semantics), so the
/// sampled offsets are 0, 1K, 4K, 16K, ... 1G. Bytes between samples, and any
/// bytes appended after the last sample that fits, do not affect the digest.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let file_length = file.metadata()?.len();
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; SAMPLE_LENGTH];

    for i in -1i32..=10 {
        let position = sample_offset(i);
        if position >= file_length {
            break;
        }
        file.seek(SeekFrom::Start(position))?;
        let bytes_read = read_block(&mut file, &mut buffer)?;
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn sample_offset(i: i32) -> u64 {
    if i < 0 {
        0
    } else {
        SAMPLE_BASE << (2 * i as u32)
    }
}

/// Fills as much of `buffer` as the file allows.
fn read_block(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
