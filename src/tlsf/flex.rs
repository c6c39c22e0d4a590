//! A growable wrapper around [`TlsfCore`] that pulls fresh pools from a
//! [`VirtualArena`] collaborator on demand.
//!
//! Mirrors the `FlexTlsf`/`FlexSource` split found in other TLSF
//! implementations, rebased onto this crate's `VirtualArena` trait instead
//! of a source trait tied to a single global allocator.
use core::{alloc::Layout, ptr::NonNull};

use super::{TlsfCore, GRANULARITY};
use crate::arena::VirtualArena;
use crate::int::BinInteger;

/// [`TlsfCore`] plus automatic pool growth.
#[derive(Debug)]
pub struct GrowableTlsf<
    'pool,
    Arena: VirtualArena,
    FLBitmap,
    SLBitmap,
    const FLLEN: usize,
    const SLLEN: usize,
> {
    arena: Arena,
    core: TlsfCore<'pool, FLBitmap, SLBitmap, FLLEN, SLLEN>,
    /// The most recently grown commitment, so we can try to extend it in
    /// place before asking the arena for a brand new one.
    last_commit: Option<[NonNull<u8>; 2]>,
}

// Safety: ownership of all pool memory flows through `arena`/`core`, neither
// of which has interior mutability.
unsafe impl<Arena: VirtualArena + Send, FLBitmap, SLBitmap, const FLLEN: usize, const SLLEN: usize>
    Send for GrowableTlsf<'_, Arena, FLBitmap, SLBitmap, FLLEN, SLLEN>
{
}

impl<
        'pool,
        Arena: VirtualArena,
        FLBitmap: BinInteger,
        SLBitmap: BinInteger,
        const FLLEN: usize,
        const SLLEN: usize,
    > GrowableTlsf<'pool, Arena, FLBitmap, SLBitmap, FLLEN, SLLEN>
{
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            core: TlsfCore::new(),
            last_commit: None,
        }
    }

    /// Pre-commit `initial_size` bytes.
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        if initial_size > 0 {
            self.grow_pool(Layout::from_size_align(initial_size, 1).unwrap());
        }
        self
    }

    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if let Some(p) = self.core.allocate(layout) {
            return Some(p);
        }
        self.grow_pool(layout)?;
        self.core.allocate(layout)
    }

    /// # Safety
    /// Same requirements as [`TlsfCore::deallocate`].
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, align: usize) {
        self.core.deallocate(ptr, align)
    }

    /// # Safety
    /// Same requirements as [`TlsfCore::reallocate`].
    pub unsafe fn reallocate(&mut self, ptr: NonNull<u8>, layout: Layout) -> Option<NonNull<u8>> {
        if let Some(p) = self.core.reallocate(ptr, layout) {
            return Some(p);
        }
        self.grow_pool(layout)?;
        self.core.reallocate(ptr, layout)
    }

    pub fn release(&mut self) {
        self.core.release();
    }

    fn grow_pool(&mut self, layout: Layout) -> Option<()> {
        // Ballpark the extra bytes needed: the request plus a sentinel's
        // worth of header overhead, rounded up to granularity.
        let min_size = (layout.size() + layout.align() + GRANULARITY * 2 + GRANULARITY - 1)
            & !(GRANULARITY - 1);

        if let Some([start, old_end]) = self.last_commit {
            let min_new_end = NonNull::new(old_end.as_ptr().wrapping_add(min_size))?;
            // Safety: `[start, old_end]` is our own last commitment.
            if let Some(new_end) = unsafe { self.arena.grow_in_place(start, old_end, min_new_end) }
            {
                let grown_len = new_end.as_ptr() as usize - old_end.as_ptr() as usize;
                // Safety: `[old_end, new_end)` is freshly committed memory
                // that now belongs to us.
                unsafe {
                    self.core.insert_free_block_ptr(NonNull::new_unchecked(
                        core::ptr::slice_from_raw_parts_mut(old_end.as_ptr(), grown_len),
                    ));
                }
                self.last_commit = Some([start, new_end]);
                return Some(());
            }
        }

        // Safety: `min_size` is non-zero (we always add at least `GRANULARITY * 2`).
        let [start, end] = unsafe { self.arena.commit(min_size) }?;
        let len = end.as_ptr() as usize - start.as_ptr() as usize;
        unsafe {
            self.core.insert_free_block_ptr(NonNull::new_unchecked(
                core::ptr::slice_from_raw_parts_mut(start.as_ptr(), len),
            ));
        }
        self.last_commit = Some([start, end]);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SystemVirtualArena;
    use std::vec::Vec;

    #[test]
    fn grows_on_demand() {
        let mut t: GrowableTlsf<'static, SystemVirtualArena<16>, u32, u32, 28, 16> =
            GrowableTlsf::new(SystemVirtualArena::default());
        let mut ptrs = Vec::new();
        for _ in 0..64 {
            let p = t.allocate(Layout::new::<[u8; 4096]>()).unwrap();
            ptrs.push(p);
        }
        for p in ptrs {
            unsafe { t.deallocate(p, Layout::new::<[u8; 4096]>().align()) };
        }
    }
}
