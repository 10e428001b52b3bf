//! Fixed-size block layout of a file.
//!
//! Indices run over the inclusive range `0..=size / block_size`. When the file
//! size is an exact multiple of the block size the last index is degenerate:
//! its offset is clamped to `size - 1` and its length to 1, so it re-covers
//! the final byte instead of extending past the end. The remote store expects
//! this layout, so it is kept as is.

/// Offset and length of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Block index, starting at 0.
    pub index: u64,
    /// Byte offset of the block in the file.
    pub offset: u64,
    /// Number of bytes in the block.
    pub length: u64,
}

impl BlockDescriptor {
    /// Offset one past the last byte of the block.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Block layout for a file of `file_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    file_size: u64,
    block_size: u64,
}

impl BlockPlan {
    /// Plans a file; returns `None` for a zero block size.
    #[must_use]
    pub fn new(file_size: u64, block_size: u64) -> Option<Self> {
        (block_size > 0).then_some(Self {
            file_size,
            block_size,
        })
    }

    /// Total file size.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Block size of the location.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Highest block index (inclusive).
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.file_size / self.block_size
    }

    /// Number of blocks, `last_index + 1`.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.last_index() + 1
    }

    /// Descriptor of block `index`, or `None` past the last index.
    #[must_use]
    pub fn block(&self, index: u64) -> Option<BlockDescriptor> {
        if index > self.last_index() {
            return None;
        }
        if self.file_size == 0 {
            return Some(BlockDescriptor {
                index,
                offset: 0,
                length: 0,
            });
        }

        let mut offset = index * self.block_size;
        if offset >= self.file_size {
            offset = self.file_size - 1;
        }
        let length = self.block_size.min(self.file_size - offset);
        Some(BlockDescriptor {
            index,
            offset,
            length,
        })
    }

    /// All descriptors in index order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockDescriptor> + '_ {
        (0..=self.last_index()).filter_map(|index| self.block(index))
    }

    /// Progress after block `index` completed.
    ///
    /// Only the final block reports 100; rounding is capped at 99 before it.
    #[must_use]
    pub fn progress_after(&self, index: u64) -> u8 {
        let percent = progress_percent(index, self.last_index());
        if index < self.last_index() {
            percent.min(99)
        } else {
            percent
        }
    }
}

/// `round((index + 1) / (last_index + 1) * 100)`, clamped to 100.
#[must_use]
pub fn progress_percent(index: u64, last_index: u64) -> u8 {
    let done = u128::from(index.min(last_index)) + 1;
    let total = u128::from(last_index) + 1;
    let percent = (done * 200 + total) / (total * 2);
    u8::try_from(percent.min(100)).unwrap_or(100)
}
