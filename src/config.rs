//! OpusChess - Engine Configuration
//!
//! Resource settings that can be changed from the protocol. Requested
//! values outside the supported range are clamped, never rejected.

pub const DEFAULT_HASH_MB: usize = 32;
pub const MIN_HASH_MB: usize = 1;
pub const MAX_HASH_MB: usize = 1024;

pub const DEFAULT_THREADS: usize = 1;
pub const MIN_THREADS: usize = 1;

/// Upper bound for the thread option: the number of logical CPUs
pub fn max_threads() -> usize {
    num_cpus::get().max(MIN_THREADS)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub hash_mb: usize,
    pub threads: usize,
}

impl EngineConfig {
    pub fn new(hash_mb: usize, threads: usize) -> Self {
        let mut config = EngineConfig::default();
        config.set_hash_mb(hash_mb);
        config.set_threads(threads);
        config
    }

    /// Returns the value actually stored
    pub fn set_hash_mb(&mut self, hash_mb: usize) -> usize {
        self.hash_mb = hash_mb.clamp(MIN_HASH_MB, MAX_HASH_MB);
        self.hash_mb
    }

    /// Returns the value actually stored
    pub fn set_threads(&mut self, threads: usize) -> usize {
        self.threads = threads.clamp(MIN_THREADS, max_threads());
        self.threads
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { hash_mb: DEFAULT_HASH_MB, threads: DEFAULT_THREADS }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_clamped() {
        let mut config = EngineConfig::default();
        assert_eq!(config.set_hash_mb(0), MIN_HASH_MB);
        assert_eq!(config.set_hash_mb(1 << 20), MAX_HASH_MB);
        assert_eq!(config.set_hash_mb(64), 64);
        assert_eq!(config.set_threads(0), MIN_THREADS);
        assert_eq!(config.set_threads(usize::MAX), max_threads());
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config, EngineConfig::new(DEFAULT_HASH_MB, DEFAULT_THREADS));
    }
}
