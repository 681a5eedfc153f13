/// An ordered list of distinct `u16` indices with a fixed capacity.
///
/// Insertion order is preserved. Removal shifts the tail down, which is O(n)
/// but n is bounded by the capacity and stays small.
#[derive(Clone)]
pub struct IndexList<const N: usize> {
    items: [u16; N],
    len: usize,
}

impl<const N: usize> IndexList<N> {
    pub const fn new() -> Self {
        Self { items: [0; N], len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.items[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.as_slice().iter().copied()
    }

    pub fn front(&self) -> Option<u16> {
        self.as_slice().first().copied()
    }

    pub fn contains(&self, index: u16) -> bool {
        self.as_slice().contains(&index)
    }

    /// Append `index`. Fails if the list is full or already holds it.
    pub fn push_back(&mut self, index: u16) -> Result<(), u16> {
        if self.is_full() || self.contains(index) {
            return Err(index);
        }
        self.items[self.len] = index;
        self.len += 1;
        Ok(())
    }

    /// Remove `index` wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, index: u16) -> bool {
        match self.as_slice().iter().position(|&i| i == index) {
            Some(pos) => {
                self.remove_at(pos);
                true
            }
            None => false,
        }
    }

    /// Move `index` to the back, appending it if it was absent.
    pub fn move_to_back(&mut self, index: u16) -> Result<(), u16> {
        self.remove(index);
        self.push_back(index)
    }

    fn remove_at(&mut self, pos: usize) {
        self.items.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
    }
}

impl<const N: usize> Default for IndexList<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for IndexList<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<const N: usize> PartialEq for IndexList<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<const N: usize> Eq for IndexList<N> {}
