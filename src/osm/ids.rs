/// Hands out placeholder ids for new relations: -1, -2, -3, ...
///
/// One allocator lives for one conversion run, so ids never collide within it.
#[derive(Debug)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: -1 }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next -= 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder node id for a GTFS stop that has no OSM counterpart.
///
/// FNV-1a over the stop id, folded into `[-(2^31 - 1), -1]`, so the same stop
/// gets the same id no matter which pattern discovers it.
pub fn placeholder_node_id(stop_id: &str) -> i64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    const RANGE: u64 = (i32::MAX as u64) - 1;

    let hash = stop_id
        .bytes()
        .fold(OFFSET, |acc, b| (acc ^ b as u64).wrapping_mul(PRIME));

    -((hash % RANGE) as i64 + 1)
}
