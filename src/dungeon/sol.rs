//! # Square attributes (SOL)
//!
//! One byte per square. Only the low three bits are meaningful:
//!
//! - bit 0: the raw "passable" bit
//! - bit 1: blocks line of sight
//! - bit 2: blocks missiles

pub const PASSABLE_BIT: u8 = 0x01;
pub const BLOCKS_SIGHT_BIT: u8 = 0x02;
pub const BLOCKS_MISSILE_BIT: u8 = 0x04;

pub struct SquareAttributes {
    flags: Vec<u8>,
}

impl SquareAttributes {
    pub fn from_bytes(data: &[u8]) -> Self {
        SquareAttributes {
            flags: data.to_vec(),
        }
    }

    /// Number of squares in the level
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn raw(&self, square: usize) -> Option<u8> {
        self.flags.get(square).copied()
    }
}
