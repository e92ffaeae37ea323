/// A growable FIFO of bytes that can be appended to while it is being
/// drained.
///
/// Internally this is two append-only vectors, `current` (being read from)
/// and `pending` (being written to), plus a read offset into `current`.
/// `append` always extends `pending`; reads always consume from `current`.
/// When `current` is fully drained, `pending` is swapped in. Because reads
/// never touch `pending`, a slice returned by `get_slice` stays valid for as
/// long as the caller holds it against a `current` that hasn't been
/// reallocated out from under it within that call.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    current: Vec<u8>,
    pending: Vec<u8>,
    read_offset: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the buffer. Never invalidates slices already
    /// returned by `get_slice`, since those only ever point into `current`.
    pub fn append(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        (self.current.len() - self.read_offset) + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swaps `pending` into `current` once `current` has been fully read.
    /// Idempotent: a no-op when there is nothing left to swap in, or when
    /// `current` is not yet exhausted.
    fn swap_if_exhausted(&mut self) {
        if self.read_offset == self.current.len() {
            self.current.clear();
            self.read_offset = 0;
            std::mem::swap(&mut self.current, &mut self.pending);
        }
    }

    /// Copies up to `dst.len()` bytes into `dst`, consuming them (possibly
    /// straddling the `current`/`pending` swap boundary). Returns the number
    /// of bytes copied, which is 0 only when the buffer is empty.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0;

        while copied < dst.len() {
            self.swap_if_exhausted();

            let available = &self.current[self.read_offset..];
            if available.is_empty() {
                break;
            }

            let n = std::cmp::min(available.len(), dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&available[..n]);
            self.read_offset += n;
            copied += n;
        }

        copied
    }

    /// Returns a borrowed view of the next contiguous unread span of at most
    /// `max` bytes, consuming it. Returns `None` only when the buffer is
    /// empty; a non-empty buffer may still yield fewer than `max` bytes if
    /// `current` runs out before `pending` is swapped in, since the swap
    /// only happens once `current` is fully drained.
    pub fn get_slice(&mut self, max: usize) -> Option<&[u8]> {
        self.swap_if_exhausted();

        if self.read_offset == self.current.len() {
            return None;
        }

        let end = std::cmp::min(self.current.len(), self.read_offset + max);
        let start = self.read_offset;
        self.read_offset = end;

        Some(&self.current[start..end])
    }

    fn read_exact_straddling(&mut self, width: usize) -> Option<[u8; 8]> {
        if self.len() < width {
            return None;
        }

        let mut buf = [0u8; 8];
        let n = self.read(&mut buf[..width]);
        debug_assert_eq!(n, width);
        Some(buf)
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        self.read_exact_straddling(1).map(|b| b[0])
    }

    pub fn get_i8(&mut self) -> Option<i8> {
        self.get_u8().map(|b| b as i8)
    }

    pub fn get_u16_be(&mut self) -> Option<u16> {
        self.read_exact_straddling(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u16_le(&mut self) -> Option<u16> {
        self.read_exact_straddling(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_i16_be(&mut self) -> Option<i16> {
        self.get_u16_be().map(|v| v as i16)
    }

    pub fn get_i16_le(&mut self) -> Option<i16> {
        self.get_u16_le().map(|v| v as i16)
    }

    pub fn get_u32_be(&mut self) -> Option<u32> {
        self.read_exact_straddling(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u32_le(&mut self) -> Option<u32> {
        self.read_exact_straddling(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32_be(&mut self) -> Option<i32> {
        self.get_u32_be().map(|v| v as i32)
    }

    pub fn get_i32_le(&mut self) -> Option<i32> {
        self.get_u32_le().map(|v| v as i32)
    }

    pub fn get_u64_be(&mut self) -> Option<u64> {
        self.read_exact_straddling(8).map(|b| u64::from_be_bytes(b))
    }

    pub fn get_u64_le(&mut self) -> Option<u64> {
        self.read_exact_straddling(8).map(|b| u64::from_le_bytes(b))
    }

    pub fn get_i64_be(&mut self) -> Option<i64> {
        self.get_u64_be().map(|v| v as i64)
    }

    pub fn get_i64_le(&mut self) -> Option<i64> {
        self.get_u64_le().map(|v| v as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_arbitrary_sequence() {
        let mut buf = ByteBuffer::new();
        buf.append(&[1, 2, 3, 4, 5]);

        let mut out = vec![0u8; 5];
        assert_eq!(buf.read(&mut out), 5);
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn append_survives_a_partial_drain() {
        let mut buf = ByteBuffer::new();
        buf.append(&[1, 2, 3, 4]);

        let mut out = [0u8; 2];
        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(out, [1, 2]);

        buf.append(&[5, 6]);

        let mut rest = vec![0u8; 4];
        assert_eq!(buf.read(&mut rest), 4);
        assert_eq!(rest, vec![3, 4, 5, 6]);
    }

    #[test]
    fn get_slice_never_crosses_the_swap_boundary() {
        let mut buf = ByteBuffer::new();
        buf.append(&[1, 2, 3]);
        buf.append(&[4, 5]);

        // Both appends land in `pending` until the first read swaps it in,
        // so the first slice only ever sees the first append's bytes.
        let first = buf.get_slice(10).unwrap().to_vec();
        assert_eq!(first, vec![1, 2, 3]);

        let second = buf.get_slice(10).unwrap().to_vec();
        assert_eq!(second, vec![4, 5]);

        assert!(buf.get_slice(10).is_none());
    }

    #[test]
    fn s6_typed_reads_straddle_the_boundary() {
        let mut buf = ByteBuffer::new();
        buf.append(&[0, 1, 2]);
        assert_eq!(buf.get_u16_be(), Some(1));

        buf.append(&[3, 4]);
        // The next u16 straddles the old `current` (byte 2) and the newly
        // swapped-in `pending` (byte 3).
        assert_eq!(buf.get_u16_be(), Some(515));
        assert_eq!(buf.get_u8(), Some(4));
        assert_eq!(buf.get_u8(), None);
    }

    #[test]
    fn underflow_on_typed_read_is_absent_not_an_error() {
        let mut buf = ByteBuffer::new();
        buf.append(&[1]);
        assert_eq!(buf.get_u32_be(), None);
        // The partial read must not have consumed the byte.
        assert_eq!(buf.get_u8(), Some(1));
    }
}
