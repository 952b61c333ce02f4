//! Frame-indexed task resources.
//!
//! Tasks are wired up once; these wrappers dereference through the graph's
//! shared frame cursors so every execution reads the correct per-frame
//! handle without branches in the tasks themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// A shared cursor, usually the task graph's frame or image index.
pub type FrameCursor = Arc<AtomicU32>;

/// A resource that is the same for every frame.
#[derive(Debug)]
pub struct Single<T> {
    value: T,
}

impl<T> Single<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    pub const fn get(&self) -> &T {
        &self.value
    }
}

/// One resource per frame, selected by the cursor.
#[derive(Debug)]
pub struct Indexed<T> {
    items: Vec<T>,
    cursor: FrameCursor,
}

impl<T> Indexed<T> {
    /// `items` must have one entry per cursor value.
    pub fn new(items: Vec<T>, cursor: FrameCursor) -> Self {
        Self { items, cursor }
    }

    pub fn get(&self) -> &T {
        &self.items[self.cursor.load(Ordering::Acquire) as usize]
    }
}

/// One list of resources per frame, selected by the cursor.
#[derive(Debug)]
pub struct IndexedList<T> {
    lists: Vec<Vec<T>>,
    cursor: FrameCursor,
}

impl<T> IndexedList<T> {
    pub fn new(lists: Vec<Vec<T>>, cursor: FrameCursor) -> Self {
        Self { lists, cursor }
    }

    pub fn get(&self) -> &[T] {
        &self.lists[self.cursor.load(Ordering::Acquire) as usize]
    }
}

/// A flat resource list filtered per frame by a closure over
/// `(item index, cursor value)`.
pub struct FilteredList<T: Clone> {
    items: Vec<T>,
    cursor: FrameCursor,
    filter: Box<dyn Fn(usize, u32) -> bool + Send + Sync>,
}

impl<T: Clone> FilteredList<T> {
    pub fn new(
        items: Vec<T>,
        cursor: FrameCursor,
        filter: impl Fn(usize, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            items,
            cursor,
            filter: Box::new(filter),
        }
    }

    /// The entries selected for the current cursor value.
    pub fn get(&self) -> Vec<T> {
        let frame = self.cursor.load(Ordering::Acquire);
        self.items
            .iter()
            .enumerate()
            .filter(|(index, _)| (self.filter)(*index, frame))
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_follows_the_cursor() {
        let cursor: FrameCursor = Arc::new(AtomicU32::new(0));
        let indexed = Indexed::new(vec!['a', 'b'], cursor.clone());
        assert_eq!(*indexed.get(), 'a');
        cursor.store(1, Ordering::Release);
        assert_eq!(*indexed.get(), 'b');
    }

    #[test]
    fn filtered_list_selects_per_frame() {
        let cursor: FrameCursor = Arc::new(AtomicU32::new(0));
        // Two entries per frame, interleaved.
        let list = FilteredList::new(
            vec![0, 1, 2, 3],
            cursor.clone(),
            |index, frame| index as u32 / 2 == frame,
        );
        assert_eq!(list.get(), vec![0, 1]);
        cursor.store(1, Ordering::Release);
        assert_eq!(list.get(), vec![2, 3]);
    }
}
