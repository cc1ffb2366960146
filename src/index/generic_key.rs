use std::fmt;

/// Fixed-width key blob stored in B+tree pages. The tree never interprets
/// the bytes itself; ordering comes entirely from the comparator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn new() -> Self {
        Self { data: [0u8; N] }
    }

    /// Copies up to `N` bytes from the slice, zero-padding the rest.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut key = Self::new();
        let len = bytes.len().min(N);
        key.data[..len].copy_from_slice(&bytes[..len]);
        key
    }

    pub fn from_integer(value: i64) -> Self {
        let mut key = Self::new();
        key.set_from_integer(value);
        key
    }

    /// Stores the integer little-endian in the leading bytes.
    pub fn set_from_integer(&mut self, value: i64) {
        let bytes = value.to_le_bytes();
        let len = N.min(8);
        self.data[..len].copy_from_slice(&bytes[..len]);
    }

    /// Reads back an integer written by `set_from_integer`.
    pub fn to_integer(&self) -> i64 {
        let mut bytes = [0u8; 8];
        let len = N.min(8);
        bytes[..len].copy_from_slice(&self.data[..len]);
        i64::from_le_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>({})", N, self.to_integer())
    }
}
