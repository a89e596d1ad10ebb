//! Runtime configuration.

/// Default number of heap slots.
pub const DEFAULT_HEAP_CAPACITY: usize = 1 << 16;

/// Default limit on nested journey invocations.
pub const DEFAULT_MAX_FRAMES: usize = 1000;

/// Default limit on simultaneously installed exception handlers.
pub const DEFAULT_MAX_HANDLERS: usize = 2048;

/// Tunables for a [`Vm`](crate::Vm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Number of uniform slots in the heap arena.
    pub heap_capacity: usize,
    /// Maximum depth of the frame stack.
    pub max_frames: usize,
    /// Maximum depth of the exception handler stack.
    pub max_handlers: usize,
    /// Seed for the `RANDOM` interrupt; `None` seeds from the clock.
    pub random_seed: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_capacity: DEFAULT_HEAP_CAPACITY,
            max_frames: DEFAULT_MAX_FRAMES,
            max_handlers: DEFAULT_MAX_HANDLERS,
            random_seed: None,
        }
    }
}

impl VmConfig {
    /// Sets the arena size in slots.
    pub fn with_heap_capacity(mut self, slots: usize) -> Self {
        self.heap_capacity = slots;
        self
    }

    /// Sets the frame stack limit.
    pub fn with_max_frames(mut self, frames: usize) -> Self {
        self.max_frames = frames;
        self
    }

    /// Sets the handler stack limit.
    pub fn with_max_handlers(mut self, handlers: usize) -> Self {
        self.max_handlers = handlers;
        self
    }

    /// Fixes the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.heap_capacity, 65536);
        assert_eq!(config.max_frames, 1000);
        assert_eq!(config.max_handlers, 2048);
        assert!(config.random_seed.is_none());
    }

    #[test]
    fn test_builder() {
        let config = VmConfig::default()
            .with_heap_capacity(64)
            .with_max_frames(8)
            .with_max_handlers(4)
            .with_random_seed(42);
        assert_eq!(config.heap_capacity, 64);
        assert_eq!(config.max_frames, 8);
        assert_eq!(config.max_handlers, 4);
        assert_eq!(config.random_seed, Some(42));
    }
}
