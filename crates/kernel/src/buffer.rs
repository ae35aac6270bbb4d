/// Capacity a fresh buffer starts with.
pub const INITIAL_CAPACITY: usize = 4;

/// Append-only buffer of fixed-width values.
///
/// Starts at [`INITIAL_CAPACITY`] slots and doubles, copying the filled prefix, whenever a
/// push finds it full. [`GrowBuffer::trim`] hands the pushed values over exactly once.
#[derive(Debug, Clone)]
pub struct GrowBuffer<T> {
    slots: Vec<T>,
    len: usize,
}

impl<T: Copy + Default> GrowBuffer<T> {
    pub fn new() -> Self {
        Self {
            slots: vec![T::default(); INITIAL_CAPACITY],
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.len == self.slots.len() {
            let mut grown = vec![T::default(); self.slots.len() * 2];
            grown[..self.len].copy_from_slice(&self.slots[..self.len]);
            self.slots = grown;
        }
        self.slots[self.len] = value;
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Consume the buffer, returning exactly the pushed values in push order.
    pub fn trim(mut self) -> Vec<T> {
        self.slots.truncate(self.len);
        self.slots.shrink_to_fit();
        self.slots
    }
}

impl<T: Copy + Default> Default for GrowBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
