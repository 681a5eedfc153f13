use super::core::{align_up, is_aligned, AllocError};
use crate::klog_warn;

/// Size of the in-band header in front of every block: payload size, used
/// flag and the address of the next header (0 ends the sequence).
pub const BLOCK_HEADER_SIZE: u32 = 12;

/// Every payload size is rounded up to this.
pub const HEAP_ALIGN: u32 = 4;

const SIZE_FIELD: usize = 0;
const USED_FIELD: usize = 4;
const NEXT_FIELD: usize = 8;

// ============================================================================
// BLOCK VIEW
// ============================================================================

/// One block as seen by [`Heap::blocks`]. `addr` is the header address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub addr: u32,
    pub size: u32,
    pub used: bool,
}

impl BlockInfo {
    pub fn payload(&self) -> u32 {
        self.addr + BLOCK_HEADER_SIZE
    }

    /// First address past the payload.
    pub fn end(&self) -> u32 {
        self.payload() + self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub total: u32,
    pub used: u32,
    pub free: u32,
    pub blocks: u32,
    pub free_blocks: u32,
    pub largest_free: u32,
}

// ============================================================================
// FIRST-FIT HEAP
// ============================================================================

/// First-fit allocator over one fixed region.
///
/// Addresses handed out are kernel addresses: `base` is where `memory`
/// starts in the kernel's address space. Headers live inside `memory` and
/// tile it exactly, so walking the `next` links from the first header visits
/// every byte of the region once.
pub struct Heap {
    base: u32,
    memory: &'static mut [u8],
    size: u32,
    used: u32,
}

impl Heap {
    /// Take ownership of `memory`, which the kernel sees at address `base`.
    ///
    /// The usable length is rounded down to a multiple of [`HEAP_ALIGN`]. The
    /// region starts out as one free block.
    pub fn new(base: u32, memory: &'static mut [u8]) -> Result<Self, AllocError> {
        if base == 0 || !is_aligned(base, HEAP_ALIGN) {
            return Err(AllocError::InvalidAddress);
        }
        let len = u32::try_from(memory.len()).map_err(|_| AllocError::InvalidSize)?;
        let size = len & !(HEAP_ALIGN - 1);
        if size <= BLOCK_HEADER_SIZE {
            return Err(AllocError::RegionTooSmall);
        }
        base.checked_add(size).ok_or(AllocError::InvalidAddress)?;

        let mut heap = Self {
            base,
            memory,
            size,
            used: 0,
        };
        heap.write_header(base, size - BLOCK_HEADER_SIZE, false, 0);
        Ok(heap)
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Payload bytes currently handed out.
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Allocate `size` bytes and return the payload address.
    ///
    /// The first free block that fits is taken. It is split when what would be
    /// left over can hold more than a header, otherwise the whole block is
    /// handed out.
    pub fn allocate(&mut self, size: u32) -> Result<u32, AllocError> {
        if size == 0 || size > u32::MAX - HEAP_ALIGN {
            return Err(AllocError::InvalidSize);
        }
        let size = align_up(size, HEAP_ALIGN);

        let mut current = self.base;
        while current != 0 {
            let block = self.block_at(current);
            if !block.used && block.size >= size {
                if block.size - size > BLOCK_HEADER_SIZE {
                    let split = current + BLOCK_HEADER_SIZE + size;
                    let next = self.read_field(current, NEXT_FIELD);
                    self.write_header(split, block.size - size - BLOCK_HEADER_SIZE, false, next);
                    self.write_field(current, NEXT_FIELD, split);
                    self.write_field(current, SIZE_FIELD, size);
                }
                self.write_field(current, USED_FIELD, 1);
                self.used += self.read_field(current, SIZE_FIELD);
                return Ok(current + BLOCK_HEADER_SIZE);
            }
            current = self.read_field(current, NEXT_FIELD);
        }
        Err(AllocError::OutOfMemory)
    }

    /// Release the block whose payload starts at `addr`.
    ///
    /// Null is ignored. Anything that is not the payload of a used block,
    /// including interior pointers and blocks already free, is reported and
    /// ignored.
    pub fn free(&mut self, addr: u32) {
        if addr == 0 {
            return;
        }
        let header = match self.header_for(addr) {
            Ok(header) => header,
            Err(err) => {
                klog_warn!("heap: free({:#x}) ignored: {}", addr, err);
                return;
            }
        };

        let block = self.block_at(header);
        self.write_field(header, USED_FIELD, 0);
        self.used = self.used.saturating_sub(block.size);

        // Forward merge.
        let next = self.read_field(header, NEXT_FIELD);
        if next != 0 {
            let following = self.block_at(next);
            if !following.used {
                let merged = block.size + BLOCK_HEADER_SIZE + following.size;
                self.write_field(header, SIZE_FIELD, merged);
                self.write_field(header, NEXT_FIELD, self.read_field(next, NEXT_FIELD));
            }
        }

        // Backward merge. Headers only link forward, so find the predecessor
        // by walking from the head.
        let mut prev = self.base;
        while prev != 0 && self.read_field(prev, NEXT_FIELD) != header {
            prev = self.read_field(prev, NEXT_FIELD);
        }
        if prev != 0 && !self.block_at(prev).used {
            let merged = self.read_field(prev, SIZE_FIELD)
                + BLOCK_HEADER_SIZE
                + self.read_field(header, SIZE_FIELD);
            self.write_field(prev, SIZE_FIELD, merged);
            self.write_field(prev, NEXT_FIELD, self.read_field(header, NEXT_FIELD));
        }
    }

    /// Walk the block sequence in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            heap: self,
            next: self.base,
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total: self.size,
            ..HeapStats::default()
        };
        for block in self.blocks() {
            stats.blocks += 1;
            if block.used {
                stats.used += block.size;
            } else {
                stats.free += block.size;
                stats.free_blocks += 1;
                stats.largest_free = stats.largest_free.max(block.size);
            }
        }
        stats
    }

    /// Mutable view of `len` bytes starting at kernel address `addr`.
    pub fn bytes_mut(&mut self, addr: u32, len: u32) -> Result<&mut [u8], AllocError> {
        let start = self.offset(addr)?;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= self.size as usize)
            .ok_or(AllocError::InvalidAddress)?;
        Ok(&mut self.memory[start..end])
    }

    pub fn bytes(&self, addr: u32, len: u32) -> Result<&[u8], AllocError> {
        let start = self.offset(addr)?;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= self.size as usize)
            .ok_or(AllocError::InvalidAddress)?;
        Ok(&self.memory[start..end])
    }

    fn header_for(&self, payload: u32) -> Result<u32, AllocError> {
        let header = payload
            .checked_sub(BLOCK_HEADER_SIZE)
            .ok_or(AllocError::InvalidAddress)?;
        if !self.contains(header)
            || !is_aligned(header - self.base, HEAP_ALIGN)
            || header + BLOCK_HEADER_SIZE > self.end()
        {
            return Err(AllocError::InvalidAddress);
        }
        if !self.blocks().any(|block| block.addr == header && block.used) {
            return Err(AllocError::InvalidAddress);
        }
        Ok(header)
    }

    fn offset(&self, addr: u32) -> Result<usize, AllocError> {
        if !self.contains(addr) {
            return Err(AllocError::InvalidAddress);
        }
        Ok((addr - self.base) as usize)
    }

    fn block_at(&self, header: u32) -> BlockInfo {
        BlockInfo {
            addr: header,
            size: self.read_field(header, SIZE_FIELD),
            used: self.read_field(header, USED_FIELD) != 0,
        }
    }

    fn read_field(&self, header: u32, field: usize) -> u32 {
        let at = (header - self.base) as usize + field;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.memory[at..at + 4]);
        u32::from_le_bytes(raw)
    }

    fn write_field(&mut self, header: u32, field: usize, value: u32) {
        let at = (header - self.base) as usize + field;
        self.memory[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn write_header(&mut self, header: u32, size: u32, used: bool, next: u32) {
        self.write_field(header, SIZE_FIELD, size);
        self.write_field(header, USED_FIELD, used as u32);
        self.write_field(header, NEXT_FIELD, next);
    }
}

pub struct Blocks<'a> {
    heap: &'a Heap,
    next: u32,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.next == 0 {
            return None;
        }
        let block = self.heap.block_at(self.next);
        self.next = self.heap.read_field(self.next, NEXT_FIELD);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::leaked_region;

    const BASE: u32 = 0x0010_0000;
    const MIB: usize = 1024 * 1024;

    fn heap(len: usize) -> Heap {
        Heap::new(BASE, leaked_region(len)).unwrap()
    }

    fn assert_tiles(heap: &Heap) {
        let mut expected = heap.base();
        for block in heap.blocks() {
            assert_eq!(block.addr, expected, "gap or overlap at {:#x}", expected);
            expected = block.end();
        }
        assert_eq!(expected, heap.end());
    }

    #[test]
    fn fresh_heap_is_one_free_block() {
        let heap = heap(MIB);
        let blocks: Vec<_> = heap.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].size, MIB as u32 - BLOCK_HEADER_SIZE);
        assert!(!blocks[0].used);
    }

    #[test]
    fn rejects_tiny_and_misplaced_regions() {
        assert_eq!(
            Heap::new(BASE, leaked_region(8)).err(),
            Some(AllocError::RegionTooSmall)
        );
        assert_eq!(
            Heap::new(0, leaked_region(64)).err(),
            Some(AllocError::InvalidAddress)
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut heap = heap(4096);
        assert_eq!(heap.allocate(0), Err(AllocError::InvalidSize));
    }

    #[test]
    fn two_allocations_then_free_restores_one_block() {
        let mut heap = heap(MIB);
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(50).unwrap();
        assert_ne!(a, b);
        assert!(b >= a + 100 + BLOCK_HEADER_SIZE);
        assert_eq!(heap.used(), 100 + 52);

        heap.free(a);
        heap.free(b);
        let stats = heap.stats();
        assert_eq!(heap.used(), 0);
        assert_eq!(stats.used, 0);
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.largest_free, MIB as u32 - BLOCK_HEADER_SIZE);
    }

    #[test]
    fn sizes_round_up_to_four() {
        let mut heap = heap(4096);
        let a = heap.allocate(1).unwrap();
        let b = heap.allocate(1).unwrap();
        assert_eq!(b - a, 4 + BLOCK_HEADER_SIZE);
        assert_eq!(a % HEAP_ALIGN, 0);
    }

    #[test]
    fn small_remainder_is_not_split() {
        // One free block of 64 bytes: asking for 56 leaves 8, less than a header.
        let mut heap = heap(64 + BLOCK_HEADER_SIZE as usize);
        let a = heap.allocate(56).unwrap();
        assert_eq!(heap.stats().blocks, 1);
        assert_eq!(heap.used(), 64);
        assert_eq!(heap.allocate(4), Err(AllocError::OutOfMemory));
        heap.free(a);
        assert_eq!(heap.used(), 0);
    }

    #[test]
    fn out_of_memory_is_an_error() {
        let mut heap = heap(256);
        assert_eq!(heap.allocate(1024), Err(AllocError::OutOfMemory));
        assert!(heap.allocate(200).is_ok());
        assert_eq!(heap.allocate(200), Err(AllocError::OutOfMemory));
    }

    #[test]
    fn first_fit_reuses_earliest_hole() {
        let mut heap = heap(4096);
        let a = heap.allocate(64).unwrap();
        let _b = heap.allocate(64).unwrap();
        let c = heap.allocate(64).unwrap();
        let _d = heap.allocate(64).unwrap();
        heap.free(a);
        heap.free(c);
        assert_eq!(heap.allocate(32).unwrap(), a);
        assert_eq!(heap.allocate(64).unwrap(), c);
        assert_tiles(&heap);
    }

    #[test]
    fn free_merges_with_both_neighbours() {
        let mut heap = heap(4096);
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();
        let c = heap.allocate(64).unwrap();
        let _guard = heap.allocate(64).unwrap();

        heap.free(a);
        heap.free(c);
        assert_eq!(heap.stats().free_blocks, 3);
        heap.free(b);
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(heap.blocks().next().unwrap().size, 3 * 64 + 2 * BLOCK_HEADER_SIZE);
        assert_tiles(&heap);
    }

    #[test]
    fn null_and_foreign_frees_are_ignored() {
        let mut heap = heap(4096);
        let a = heap.allocate(16).unwrap();
        heap.free(0);
        heap.free(0xDEAD_0000);
        assert_eq!(heap.used(), 16);
        heap.free(a);
        assert_eq!(heap.used(), 0);
    }

    #[test]
    fn interior_and_repeated_frees_are_ignored() {
        let mut heap = heap(4096);
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();
        heap.bytes_mut(a, 4).unwrap().copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let before = heap.stats();

        heap.free(a + 4);
        heap.free(b + 64);
        assert_eq!(heap.stats(), before);
        assert_tiles(&heap);

        heap.free(a);
        heap.free(a);
        assert_eq!(heap.used(), 64);
        assert_eq!(heap.stats().free_blocks, 2);
        assert_tiles(&heap);
    }

    #[test]
    fn live_allocations_never_overlap() {
        let mut heap = heap(64 * 1024);
        let mut live: Vec<(u32, u32)> = Vec::new();
        // Deterministic mix of allocations and frees.
        let mut seed = 0x1234_5678u32;
        for _ in 0..400 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            if seed % 3 == 0 && !live.is_empty() {
                let (addr, _) = live.swap_remove((seed as usize / 3) % live.len());
                heap.free(addr);
            } else {
                let size = 1 + (seed >> 8) % 700;
                if let Ok(addr) = heap.allocate(size) {
                    live.push((addr, size));
                }
            }
            assert_tiles(&heap);
        }
        live.sort();
        for pair in live.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
        for (addr, _) in live.drain(..) {
            heap.free(addr);
        }
        assert_eq!(heap.stats().blocks, 1);
        assert_eq!(heap.used(), 0);
    }

    #[test]
    fn payload_bytes_are_writable() {
        let mut heap = heap(4096);
        let a = heap.allocate(8).unwrap();
        heap.bytes_mut(a, 8).unwrap().copy_from_slice(b"abcdefgh");
        assert_eq!(heap.bytes(a, 8).unwrap(), b"abcdefgh");
        assert_eq!(heap.bytes_mut(heap.end() - 4, 8).err(), Some(AllocError::InvalidAddress));
    }
}
