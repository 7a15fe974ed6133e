//! Small read helpers shared by the probe and the backends.

use std::io::{self, Read};

/// Read until `buf` is full or the reader hits end of file.
///
/// Returns the number of bytes filled, which is less than `buf.len()` only
/// at end of file. `Interrupted` reads are retried.
pub(crate) fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
