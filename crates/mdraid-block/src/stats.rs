//! I/O statistics for the block device

/// Counters kept by [`crate::Mdadm`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoStats {
    /// Completed read requests
    pub read_ops: u64,
    /// Completed write requests
    pub write_ops: u64,
    /// Bytes returned to callers
    pub read_bytes: u64,
    /// Bytes accepted from callers
    pub write_bytes: u64,
    /// Primitive operations sent to the array
    pub primitives: u64,
    /// Blocks served from the cache on the read path
    pub cache_hits: u64,
    /// Blocks fetched from the array on the read path
    pub cache_misses: u64,
}

impl IoStats {
    /// Record a completed read
    pub const fn record_read(&mut self, bytes: u64) {
        self.read_ops += 1;
        self.read_bytes += bytes;
    }

    /// Record a completed write
    pub const fn record_write(&mut self, bytes: u64) {
        self.write_ops += 1;
        self.write_bytes += bytes;
    }

    /// Primitive operations issued per completed request
    #[must_use]
    pub fn primitives_per_op(&self) -> f64 {
        let ops = self.read_ops + self.write_ops;
        if ops == 0 {
            return 0.0;
        }
        self.primitives as f64 / ops as f64
    }
}
