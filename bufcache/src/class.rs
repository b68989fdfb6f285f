use std::sync::{Mutex, MutexGuard, PoisonError};

/// One bucket of retained buffers sharing a nominal capacity.
pub(crate) struct SizeClass<T> {
    size: usize,
    max_retained: usize,
    free: Mutex<Vec<Vec<T>>>,
}

impl<T> SizeClass<T> {
    pub(crate) fn new(size: usize, max_retained: usize) -> Self {
        Self {
            size,
            max_retained,
            free: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<T>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop a retained buffer or allocate one with the class capacity.
    pub(crate) fn take(&self) -> Vec<T> {
        match self.lock().pop() {
            Some(buf) => buf,
            None => {
                tracing::trace!(class = self.size, "Size class empty, allocating");
                Vec::with_capacity(self.size)
            }
        }
    }

    /// Retain a cleared buffer. Returns `false` if the class is full.
    pub(crate) fn put(&self, buf: Vec<T>) -> bool {
        let mut free = self.lock();
        if free.len() >= self.max_retained {
            return false;
        }
        free.push(buf);
        true
    }

    pub(crate) fn retained(&self) -> usize {
        self.lock().len()
    }
}
