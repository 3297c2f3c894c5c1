//! Worker pool sizing
//!
//! Picks how many threads a batch run gets:
//! - a share of the machine's cores, clamped to sane bounds
//! - overridable through the `PIXEL_FILTER_THREADS` environment variable

use std::sync::OnceLock;

/// Environment variable that pins the pool size.
pub const THREADS_ENV: &str = "PIXEL_FILTER_THREADS";

/// Cached optimal thread count for this system
static OPTIMAL_THREADS: OnceLock<usize> = OnceLock::new();

/// Configuration for thread allocation
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Percentage of cores to use (0-100)
    pub core_percentage: usize,
    /// Minimum threads to allocate
    pub min_threads: usize,
    /// Maximum threads to allocate
    pub max_threads: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            core_percentage: 80,
            min_threads: 2,
            max_threads: 16,
        }
    }
}

/// Calculate optimal thread count based on system capabilities
pub fn calculate_optimal_threads(config: &ThreadConfig) -> usize {
    let cpu_count = num_cpus::get();
    let calculated = (cpu_count * config.core_percentage / 100).max(1);
    calculated.clamp(config.min_threads, config.max_threads.max(config.min_threads))
}

/// Get optimal threads for batch filtering (cached)
pub fn get_optimal_threads() -> usize {
    *OPTIMAL_THREADS.get_or_init(|| calculate_optimal_threads(&ThreadConfig::default()))
}

/// Parses an override value. Zero, negative or garbage means "no override".
pub fn parse_thread_override(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Thread count from `PIXEL_FILTER_THREADS`, if set to a positive integer.
pub fn threads_from_env() -> Option<usize> {
    let raw = std::env::var(THREADS_ENV).ok()?;
    let parsed = parse_thread_override(&raw);
    if parsed.is_none() {
        tracing::warn!(value = %raw, "Ignoring invalid {}", THREADS_ENV);
    }
    parsed
}
