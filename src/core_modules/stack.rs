// THEORY:
// Every flood fill in the engine is iterative. The `GrowableStack` is its
// worklist: a LIFO of flat pixel indices that starts with a generous capacity
// and grows by a fixed increment when full, never shrinking. It is created by
// the call that needs it and dropped when that call returns, so no scratch
// memory survives a frame.
//
// Growth goes through `Vec::reserve_exact`; an allocation failure aborts the
// process, which is the intended behaviour on memory-starved targets.

/// Initial number of slots.
pub const STACK_INIT_SIZE: usize = 10_000;
/// Slots added on every overflow.
pub const STACK_INCREMENT: usize = 1_000;

#[derive(Debug)]
pub struct GrowableStack {
    items: Vec<usize>,
    capacity: usize,
    increment: usize,
}

impl Default for GrowableStack {
    fn default() -> Self {
        Self::with_capacity(STACK_INIT_SIZE)
    }
}

impl GrowableStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_increment(capacity, STACK_INCREMENT)
    }

    pub fn with_increment(capacity: usize, increment: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            increment: increment.max(1),
        }
    }

    pub fn push(&mut self, value: usize) {
        if self.items.len() >= self.capacity {
            self.items.reserve_exact(self.increment);
            self.capacity += self.increment;
        }
        self.items.push(value);
    }

    /// `None` on an empty stack.
    pub fn pop(&mut self) -> Option<usize> {
        self.items.pop()
    }

    /// Index of the next free slot.
    pub fn top(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
