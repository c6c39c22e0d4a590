//! `ObjectComponentStore`: an archetype-free object/component/tag
//! store. Object types are registered up front with a fixed instance cap;
//! each type's component slots are then preallocated by local index
//! (`register_component_for_object`), and every operation after that is a
//! bitmap flip plus a redirection-array lookup — no per-call allocation.
//!
//! Bookkeeping arrays (`object_state`, `tag_bits`, the redirection tables)
//! live in plain `Vec`s, the same way [`crate::segmented`]'s cascades and
//! [`crate::bitset`] itself do; only the variable-sized, variable-aligned
//! component payload storage goes through the pluggable [`crate::arena::VirtualArena`]
//! collaborator, since that's the one piece whose size/align isn't known
//! until a caller registers a component type.
use core::alloc::Layout;
use core::ptr::NonNull;

use alloc::vec;
use alloc::vec::Vec;

use crate::arena::VirtualArena;
use crate::bitset::{Binmap, Duomap};
use crate::error::AllocError;

const NONE_SLOT: u32 = u32::MAX;

/// Opaque handle returned by [`ObjectComponentStore::register_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTypeId(usize);

struct ComponentContainer {
    element_size: usize,
    max_count: usize,
    occupancy: Binmap,
    storage: NonNull<u8>,
    storage_end: NonNull<u8>,
    /// `redirection[instance]` is the local component slot for that
    /// instance, or [`NONE_SLOT`] if the instance has no component here.
    redirection: Vec<u32>,
}

struct ObjectType {
    max_instances: usize,
    max_tags: usize,
    tag_words_per_instance: usize,
    object_state: Duomap,
    tag_bits: Vec<u32>,
    /// Indexed by the caller-chosen `local_slot`; `None` until
    /// [`ObjectComponentStore::register_component_for_object`] fills it in.
    components: Vec<Option<ComponentContainer>>,
}

impl ObjectType {
    fn tag_word_index(&self, instance: u32, tag: u32) -> (usize, u32) {
        debug_assert!((tag as usize) < self.max_tags);
        let base = instance as usize * self.tag_words_per_instance;
        (base + (tag / 32) as usize, tag % 32)
    }
}

/// The object/component/tag store core.
pub struct ObjectComponentStore<A: VirtualArena> {
    arena: A,
    object_types: Vec<ObjectType>,
}

impl<A: VirtualArena> ObjectComponentStore<A> {
    pub fn new(arena: A) -> Self {
        Self {
            arena,
            object_types: Vec::new(),
        }
    }

    /// Register a new object type with a fixed instance cap, a fixed number
    /// of local component slots, and a fixed tag-bit count.
    pub fn register_object(
        &mut self,
        max_instances: usize,
        max_components: usize,
        max_tags: usize,
    ) -> ObjectTypeId {
        let tag_words_per_instance = (max_tags + 31) / 32;
        let object_type = ObjectType {
            max_instances,
            max_tags,
            tag_words_per_instance,
            object_state: Duomap::new(max_instances),
            tag_bits: vec![0u32; max_instances * tag_words_per_instance],
            components: (0..max_components).map(|_| None).collect(),
        };
        self.object_types.push(object_type);
        ObjectTypeId(self.object_types.len() - 1)
    }

    /// Preallocate storage for a component type at `local_slot`, via the
    /// store's [`VirtualArena`].
    ///
    /// # Panics
    /// If `local_slot` is out of range or already registered.
    pub fn register_component_for_object(
        &mut self,
        obj: ObjectTypeId,
        local_slot: usize,
        max_components_of_this_kind: usize,
        size: usize,
        align: usize,
    ) -> Result<(), AllocError> {
        let object_type = &mut self.object_types[obj.0];
        assert!(local_slot < object_type.components.len(), "local_slot out of range");
        assert!(
            object_type.components[local_slot].is_none(),
            "local_slot already registered"
        );

        let element_size = Layout::from_size_align(size, align)
            .map_err(|_| AllocError::InvalidArgument)?
            .pad_to_align()
            .size();
        let total = element_size
            .checked_mul(max_components_of_this_kind)
            .ok_or(AllocError::InvalidArgument)?;

        let [storage, storage_end] = if total == 0 {
            [NonNull::dangling(), NonNull::dangling()]
        } else {
            unsafe { self.arena.commit(total) }.ok_or(AllocError::OutOfMemory)?
        };

        object_type.components[local_slot] = Some(ComponentContainer {
            element_size,
            max_count: max_components_of_this_kind,
            occupancy: Binmap::new(max_components_of_this_kind),
            storage,
            storage_end,
            redirection: vec![NONE_SLOT; object_type.max_instances],
        });
        Ok(())
    }

    /// Allocate a fresh instance slot.
    pub fn create_object(&mut self, obj: ObjectTypeId) -> Result<u32, AllocError> {
        let object_type = &mut self.object_types[obj.0];
        let instance = object_type
            .object_state
            .find_free_and_set_used()
            .ok_or(AllocError::Capacity)? as u32;
        Ok(instance)
    }

    /// Free an instance, releasing every component it still holds and
    /// clearing its tag bits.
    pub fn destroy_object(&mut self, obj: ObjectTypeId, instance: u32) {
        let object_type = &mut self.object_types[obj.0];
        for container in object_type.components.iter_mut().flatten() {
            let slot = &mut container.redirection[instance as usize];
            if *slot != NONE_SLOT {
                container.occupancy.set_free(*slot as usize);
                *slot = NONE_SLOT;
            }
        }
        let len = object_type.tag_words_per_instance;
        let start = instance as usize * len;
        for w in &mut object_type.tag_bits[start..start + len] {
            *w = 0;
        }
        object_type.object_state.set_free(instance as usize);
    }

    /// Attach a component at `local_slot` to `instance`, returning a pointer
    /// to its (uninitialized) storage.
    pub fn add_component(
        &mut self,
        obj: ObjectTypeId,
        instance: u32,
        local_slot: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let container = self.object_types[obj.0].components[local_slot]
            .as_mut()
            .expect("component type not registered for this local_slot");
        let slot = container
            .occupancy
            .find_free_and_set_used()
            .ok_or(AllocError::Capacity)?;
        container.redirection[instance as usize] = slot as u32;
        Ok(unsafe {
            NonNull::new_unchecked(container.storage.as_ptr().add(slot * container.element_size))
        })
    }

    /// Detach `instance`'s component at `local_slot`, if present.
    pub fn rem_component(&mut self, obj: ObjectTypeId, instance: u32, local_slot: usize) {
        let container = self.object_types[obj.0].components[local_slot]
            .as_mut()
            .expect("component type not registered for this local_slot");
        let slot = &mut container.redirection[instance as usize];
        if *slot != NONE_SLOT {
            container.occupancy.set_free(*slot as usize);
            *slot = NONE_SLOT;
        }
    }

    pub fn get_component(
        &self,
        obj: ObjectTypeId,
        instance: u32,
        local_slot: usize,
    ) -> Option<NonNull<u8>> {
        let container = self.object_types[obj.0].components[local_slot].as_ref()?;
        let slot = container.redirection[instance as usize];
        if slot == NONE_SLOT {
            return None;
        }
        Some(unsafe {
            NonNull::new_unchecked(
                container.storage.as_ptr().add(slot as usize * container.element_size),
            )
        })
    }

    pub fn has_component(&self, obj: ObjectTypeId, instance: u32, local_slot: usize) -> bool {
        self.get_component(obj, instance, local_slot).is_some()
    }

    pub fn add_tag(&mut self, obj: ObjectTypeId, instance: u32, tag: u32) {
        let object_type = &mut self.object_types[obj.0];
        let (word, bit) = object_type.tag_word_index(instance, tag);
        object_type.tag_bits[word] |= 1 << bit;
    }

    pub fn rem_tag(&mut self, obj: ObjectTypeId, instance: u32, tag: u32) {
        let object_type = &mut self.object_types[obj.0];
        let (word, bit) = object_type.tag_word_index(instance, tag);
        object_type.tag_bits[word] &= !(1 << bit);
    }

    /// `true` iff the tag bit is set. (The original's `has_tag` inverted
    /// this for one tag kind; that inversion does not survive here — see
    /// `DESIGN.md`'s open-question decisions.)
    pub fn has_tag(&self, obj: ObjectTypeId, instance: u32, tag: u32) -> bool {
        let object_type = &self.object_types[obj.0];
        let (word, bit) = object_type.tag_word_index(instance, tag);
        (object_type.tag_bits[word] >> bit) & 1 != 0
    }

    pub fn iterate_begin(&self, obj: ObjectTypeId) -> Option<u32> {
        self.object_types[obj.0].object_state.find_used().map(|i| i as u32)
    }

    pub fn iterate_next(&self, obj: ObjectTypeId, from: u32) -> Option<u32> {
        self.object_types[obj.0]
            .object_state
            .next_used_up(from as usize)
            .map(|i| i as u32)
    }

    /// Total instances the object type is configured for.
    pub fn get_number_of_instances(&self, obj: ObjectTypeId) -> usize {
        self.object_types[obj.0].max_instances
    }

    /// Release every component container's storage back to the arena, then
    /// drop the per-object bookkeeping arrays, then the object type itself.
    /// Components and instances of `obj` must not be used afterward.
    pub fn teardown(&mut self, obj: ObjectTypeId) {
        let object_type = &mut self.object_types[obj.0];
        for container in object_type.components.iter_mut() {
            if let Some(c) = container.take() {
                if c.max_count != 0 {
                    unsafe { self.arena.decommit([c.storage, c.storage_end]) };
                }
            }
        }
        object_type.tag_bits.clear();
        object_type.object_state = Duomap::new(0);
    }
}

#[cfg(test)]
mod tests;
