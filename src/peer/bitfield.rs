use bytes::Bytes;

/// A fixed-length piece-presence bit array.
///
/// Each bit records whether a piece is available. Bits are numbered from
/// the high bit of the first byte, matching the wire encoding. Spare bits
/// in the final byte are kept zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    /// Creates an all-false bitfield for the given number of pieces.
    pub fn new(piece_count: usize) -> Self {
        Self {
            bits: vec![0; piece_count.div_ceil(8)],
            piece_count,
        }
    }

    /// Creates a bitfield from wire bytes. Returns `None` when the byte
    /// length doesn't match the piece count or a spare bit is set.
    pub fn from_bytes(bytes: &[u8], piece_count: usize) -> Option<Self> {
        if bytes.len() != piece_count.div_ceil(8) {
            return None;
        }
        let bf = Self {
            bits: bytes.to_vec(),
            piece_count,
        };
        let spare = bf.bits.len() * 8 - piece_count;
        if spare > 0 {
            let last = *bf.bits.last()?;
            if last & !(0xFFu8 << spare) != 0 {
                return None;
            }
        }
        Some(bf)
    }

    pub fn has(&self, index: u32) -> bool {
        let index = index as usize;
        if index >= self.piece_count {
            return false;
        }
        (self.bits[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    pub fn set(&mut self, index: u32) {
        let index = index as usize;
        if index < self.piece_count {
            self.bits[index / 8] |= 1 << (7 - index % 8);
        }
    }

    /// Marks every piece present.
    pub fn set_all(&mut self) {
        self.bits.fill(0xFF);
        self.clear_spare_bits();
    }

    /// Marks every piece absent.
    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// Number of present pieces.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn all_true(&self) -> bool {
        self.count() == self.piece_count
    }

    pub fn all_false(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    pub fn len(&self) -> usize {
        self.piece_count
    }

    pub fn is_empty(&self) -> bool {
        self.piece_count == 0
    }

    /// The wire encoding of this bitfield.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    /// Pieces this bitfield has that `other` lacks.
    pub fn missing_from(&self, other: &Bitfield) -> impl Iterator<Item = u32> + '_ {
        let other = other.clone();
        (0..self.piece_count as u32).filter(move |&i| self.has(i) && !other.has(i))
    }

    fn clear_spare_bits(&mut self) {
        let spare = self.bits.len() * 8 - self.piece_count;
        if spare > 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= 0xFFu8 << spare;
            }
        }
    }
}
