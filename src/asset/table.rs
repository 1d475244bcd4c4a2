use super::Handle;

/// Append-only table. Entries live until the table is dropped, so handles never dangle.
pub struct ResourceTable<T> {
    items: Vec<T>,
}

impl<T> ResourceTable<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        let index = self.items.len();
        self.items.push(item);
        Handle::new(index)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.index())
    }

    /// Linear scan; the first entry matching `pred` wins.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Handle<T>> {
        self.items.iter().position(|item| pred(item)).map(Handle::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (Handle::new(index), item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
