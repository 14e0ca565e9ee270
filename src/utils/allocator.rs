use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Typed handle handed out by an [`Arena`].
pub trait ArenaHandle: Copy + Eq + std::hash::Hash {
    fn from_id(id: GenerationalId) -> Self;
    fn id(&self) -> GenerationalId;

    fn index(&self) -> usize {
        self.id().index
    }

    fn generation(&self) -> u32 {
        self.id().generation
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub GenerationalId);

        impl $name {
            pub fn new(index: usize, generation: u32) -> Self {
                Self(GenerationalId::new(index, generation))
            }
        }

        impl ArenaHandle for $name {
            fn from_id(id: GenerationalId) -> Self {
                Self(id)
            }

            fn id(&self) -> GenerationalId {
                self.0
            }
        }
    };
}

define_handle!(
    /// Handle to a [`Body`](crate::core::body::Body) owned by a world.
    BodyHandle
);
define_handle!(
    /// Handle to a [`Fixture`](crate::core::fixture::Fixture) owned by a world.
    FixtureHandle
);
define_handle!(
    /// Handle to a [`Joint`](crate::dynamics::joints::Joint) owned by a world.
    JointHandle
);
define_handle!(
    /// Handle to a [`Contact`](crate::dynamics::contact::Contact) owned by the contact manager.
    ContactHandle
);

/// Generational arena that hands out stable handles while preventing use-after-free.
///
/// Freed slots are recycled through a free list, so steady-state insert/remove
/// churn does not allocate.
pub struct Arena<H, T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
    len: usize,
    _handle: PhantomData<fn() -> H>,
}

impl<H: ArenaHandle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ArenaHandle, T: Clone> Clone for Arena<H, T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            generations: self.generations.clone(),
            free_list: self.free_list.clone(),
            len: self.len,
            _handle: PhantomData,
        }
    }
}

impl<H: ArenaHandle, T> Arena<H, T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
            len: 0,
            _handle: PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> H {
        self.len += 1;
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return H::from_id(GenerationalId::new(index, generation));
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        H::from_id(GenerationalId::new(index, 0))
    }

    pub fn get(&self, id: H) -> Option<&T> {
        if self.is_valid(id) {
            self.items.get(id.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: H) -> Option<&mut T> {
        if self.is_valid(id) {
            self.items.get_mut(id.index()).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn remove(&mut self, id: H) -> Option<T> {
        if !self.is_valid(id) {
            return None;
        }
        let slot = self.items.get_mut(id.index())?;
        let item = slot.take()?;
        self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
        self.free_list.push_back(id.index());
        self.len -= 1;
        Some(item)
    }

    pub fn contains(&self, id: H) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> ArenaIter<'_, H, T> {
        ArenaIter {
            inner: self.items.iter().enumerate(),
            generations: &self.generations,
            _handle: PhantomData,
        }
    }

    pub fn iter_mut(&mut self) -> ArenaIterMut<'_, H, T> {
        ArenaIterMut {
            inner: self.items.iter_mut().enumerate(),
            generations: &self.generations,
            _handle: PhantomData,
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|_| H::from_id(GenerationalId::new(index, self.generations[index])))
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_valid(&self, id: H) -> bool {
        self.generations
            .get(id.index())
            .copied()
            .map(|gen| gen == id.generation())
            .unwrap_or(false)
    }
}

pub struct ArenaIter<'a, H, T> {
    inner: std::iter::Enumerate<std::slice::Iter<'a, Option<T>>>,
    generations: &'a [u32],
    _handle: PhantomData<fn() -> H>,
}

impl<'a, H: ArenaHandle, T> Iterator for ArenaIter<'a, H, T> {
    type Item = (H, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, slot) in self.inner.by_ref() {
            if let Some(item) = slot.as_ref() {
                let id = GenerationalId::new(index, self.generations[index]);
                return Some((H::from_id(id), item));
            }
        }
        None
    }
}

pub struct ArenaIterMut<'a, H, T> {
    inner: std::iter::Enumerate<std::slice::IterMut<'a, Option<T>>>,
    generations: &'a [u32],
    _handle: PhantomData<fn() -> H>,
}

impl<'a, H: ArenaHandle, T> Iterator for ArenaIterMut<'a, H, T> {
    type Item = (H, &'a mut T);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, slot) in self.inner.by_ref() {
            if let Some(item) = slot.as_mut() {
                let id = GenerationalId::new(index, self.generations[index]);
                return Some((H::from_id(id), item));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_slot_rejects_stale_handle() {
        let mut arena: Arena<BodyHandle, i32> = Arena::new();
        let first = arena.insert(1);
        assert_eq!(arena.remove(first), Some(1));

        let second = arena.insert(2);
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&2));
        assert!(arena.remove(first).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn iteration_skips_holes() {
        let mut arena: Arena<JointHandle, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        let c = arena.insert("c");
        arena.remove(b);
        let handles: Vec<_> = arena.iter().map(|(h, _)| h).collect();
        assert_eq!(handles, vec![a, c]);
        assert_eq!(arena.handles().count(), 2);
    }
}
