// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use viewer_math::{Transform, Vec3};

use crate::error::SceneError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DrawableId(pub u32);

/// Hands out increasing ids. Each collection owns its own allocator.
/// `u32::MAX` is never handed out; allocation fails once it is reached.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn allocate(&mut self) -> Result<DrawableId, SceneError> {
        let following = self
            .next
            .checked_add(1)
            .ok_or(SceneError::IdsExhausted(self.next))?;
        let id = DrawableId(self.next);
        self.next = following;
        Ok(id)
    }
}

/// One renderable object. The mesh is shared; several drawables may point at it.
#[derive(Debug)]
pub struct Drawable<M> {
    id: DrawableId,
    pub mesh: Rc<M>,
    pub transform: Transform,
    pub color: Vec3,
}

impl<M> Drawable<M> {
    pub fn id(&self) -> DrawableId {
        self.id
    }
}

#[derive(Debug)]
pub struct DrawableCollection<M> {
    ids: IdAllocator,
    items: Vec<Drawable<M>>,
}

impl<M> Default for DrawableCollection<M> {
    fn default() -> Self {
        Self {
            ids: IdAllocator::default(),
            items: Vec::new(),
        }
    }
}

impl<M> DrawableCollection<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, mesh: Rc<M>) -> Result<&mut Drawable<M>, SceneError> {
        let id = self.ids.allocate()?;
        self.items.push(Drawable {
            id,
            mesh,
            transform: Transform::default(),
            color: Vec3::ONE,
        });
        let last = self.items.len() - 1;
        Ok(&mut self.items[last])
    }

    // Ids are allocated in push order, so `items` stays sorted by id.
    fn position(&self, id: DrawableId) -> Option<usize> {
        self.items.binary_search_by_key(&id, |d| d.id).ok()
    }

    pub fn get(&self, id: DrawableId) -> Option<&Drawable<M>> {
        self.position(id).map(|i| &self.items[i])
    }

    pub fn get_mut(&mut self, id: DrawableId) -> Option<&mut Drawable<M>> {
        self.position(id).map(|i| &mut self.items[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drawable<M>> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Drawable<M>> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every drawable (and its mesh reference). Ids are not reused.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
