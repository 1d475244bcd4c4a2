use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Index into a [`ResourceTable`](super::ResourceTable), typed by what it points at.
///
/// A `Handle<Texture>` can't be passed where a `Handle<Program>` is expected, which
/// is the only thing the type parameter is for.
pub struct Handle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls so `T` needs none of these traits.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        write!(f, "Handle<{}>({})", short, self.index)
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn handle_is_copy_and_compares_by_index() {
        let h1: Handle<Marker> = Handle::new(5);
        let h2 = h1;
        assert_eq!(h1, h2);
        assert_ne!(h1, Handle::new(6));
        assert_eq!(h2.index(), 5);
    }

    #[test]
    fn debug_shows_type_and_index() {
        let h: Handle<Marker> = Handle::new(3);
        assert_eq!(format!("{h:?}"), "Handle<Marker>(3)");
    }
}
