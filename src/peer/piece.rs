use bytes::Bytes;

/// A request for a block of piece data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece_index: u32,
    pub offset: u32,
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// A received block of piece data.
#[derive(Debug, Clone)]
pub struct Block {
    pub piece_index: u32,
    pub offset: u32,
    pub data: Bytes,
}

impl Block {
    pub fn new(piece_index: u32, offset: u32, data: Bytes) -> Self {
        Self {
            piece_index,
            offset,
            data,
        }
    }
}
