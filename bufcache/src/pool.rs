//! The size-classed pool and its configuration.

use crate::class::SizeClass;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeClassError {
    #[error("min_size must be at least 1")]
    ZeroMinSize,
    #[error("factor must be at least 2, got {0}")]
    FactorTooSmall(usize),
    #[error("min_size {min} exceeds max_size {max}")]
    MinExceedsMax { min: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClassConfig {
    /// Capacity of the smallest class.
    pub min_size: usize,
    /// Upper bound on class capacities; larger requests bypass the cache.
    pub max_size: usize,
    /// Growth factor between neighbouring classes.
    pub factor: usize,
    /// Buffers retained per class before frees start dropping them.
    pub max_retained_per_class: usize,
}

impl Default for SizeClassConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 30_000,
            factor: 2,
            max_retained_per_class: 64,
        }
    }
}

impl SizeClassConfig {
    pub fn validate(&self) -> Result<(), SizeClassError> {
        if self.min_size == 0 {
            return Err(SizeClassError::ZeroMinSize);
        }
        if self.factor < 2 {
            return Err(SizeClassError::FactorTooSmall(self.factor));
        }
        if self.min_size > self.max_size {
            return Err(SizeClassError::MinExceedsMax {
                min: self.min_size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    fn class_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut size = self.min_size;
        while size <= self.max_size {
            sizes.push(size);
            match size.checked_mul(self.factor) {
                Some(next) => size = next,
                None => break,
            }
        }
        sizes
    }
}

/// Cache of `Vec<T>` buffers bucketed by capacity.
pub struct SizeClassPool<T> {
    classes: Vec<SizeClass<T>>,
    max_size: usize,
}

impl<T> SizeClassPool<T> {
    pub fn new(config: SizeClassConfig) -> Result<Self, SizeClassError> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &SizeClassConfig) -> Self {
        let classes: Vec<_> = config
            .class_sizes()
            .into_iter()
            .map(|size| SizeClass::new(size, config.max_retained_per_class))
            .collect();
        tracing::debug!(
            classes = classes.len(),
            min_size = config.min_size,
            max_size = config.max_size,
            "Created size-classed buffer cache"
        );
        Self {
            classes,
            max_size: config.max_size,
        }
    }

    /// Empty vector with capacity for at least `size` elements.
    pub fn alloc(&self, size: usize) -> Vec<T> {
        match self.classes.iter().find(|class| class.size() >= size) {
            Some(class) => class.take(),
            None => Vec::with_capacity(size),
        }
    }

    /// Clear `buf` and keep it for reuse if a class can take it.
    ///
    /// Returns whether the buffer was retained.
    pub fn free(&self, mut buf: Vec<T>) -> bool {
        let capacity = buf.capacity();
        if capacity > self.max_size {
            tracing::trace!(capacity, "Buffer too large for cache, dropping");
            return false;
        }
        // The class must never hand out less than its nominal size.
        match self
            .classes
            .iter()
            .rev()
            .find(|class| class.size() <= capacity)
        {
            Some(class) => {
                buf.clear();
                class.put(buf)
            }
            None => false,
        }
    }

    pub fn class_sizes(&self) -> Vec<usize> {
        self.classes.iter().map(SizeClass::size).collect()
    }

    /// Buffers currently retained in the class at `index`.
    pub fn retained(&self, index: usize) -> usize {
        self.classes.get(index).map_or(0, SizeClass::retained)
    }
}

impl<T> Default for SizeClassPool<T> {
    fn default() -> Self {
        Self::build(&SizeClassConfig::default())
    }
}
