/// Pieces a peer advertised in its bitfield message.
///
/// Bit 0 is the most significant bit of byte 0. Indices past the end of the stored bytes are
/// reported as missing, so an empty bitfield means "has nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn has_piece(&self, index: usize) -> bool {
        match self.0.get(index / 8) {
            Some(byte) => (byte >> (7 - index % 8)) & 1 == 1,
            None => false,
        }
    }

    /// Number of pieces advertised
    pub fn count(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }
}
