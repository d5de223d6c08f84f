//! Additive 16-bit checksum shared by every radio frame shape.
//!
//! The checksum is the wrapping sum of all bytes that precede it, stored
//! most-significant byte first. It is not a CRC: byte swaps and
//! compensating errors go undetected.

use bytes::BufMut;

/// Length of the trailing checksum field.
pub const CHECKSUM_LEN: usize = 2;

/// Computes the wrapping 16-bit sum of `data`.
#[must_use]
pub fn sum16(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// Appends the checksum of everything already in `buf`.
pub fn append<B: BufMut + AsRef<[u8]>>(buf: &mut B) {
    let sum = sum16(buf.as_ref());
    buf.put_u16(sum);
}

/// Splits `frame` into body and trailing checksum.
///
/// Returns `(body, received, computed)`, or `None` if the frame cannot hold
/// a checksum.
#[must_use]
pub fn split(frame: &[u8]) -> Option<(&[u8], u16, u16)> {
    if frame.len() < CHECKSUM_LEN {
        return None;
    }
    let (body, tail) = frame.split_at(frame.len() - CHECKSUM_LEN);
    let received = u16::from_be_bytes([tail[0], tail[1]]);
    Some((body, received, sum16(body)))
}
