//! The `VirtualArena` collaborator boundary. `polyalloc` itself never
//! talks to the OS directly; growable cores
//! ([`crate::tlsf::flex`], [`crate::offset`]) are generic over this trait
//! instead, the way a `FlexSource`-style source trait decouples an allocator
//! core from its memory supplier.
use core::{alloc::Layout, ptr::NonNull};

/// A source of growable memory pools.
///
/// # Safety
///
/// Implementations must hand out non-overlapping, dereferenceable memory
/// that remains valid until [`Self::decommit`] releases it (or forever, if
/// [`Self::supports_decommit`] returns `false`).
pub unsafe trait VirtualArena {
    /// Reserve and commit at least `min_size` bytes. Returns the committed
    /// range `[start, end)` on success.
    ///
    /// # Safety
    ///
    /// `min_size` must not be zero.
    unsafe fn commit(&mut self, min_size: usize) -> Option<[NonNull<u8>; 2]>;

    /// Attempt to extend an existing committed range in place. Returns the
    /// new end address on success.
    ///
    /// # Safety
    ///
    /// `[start, old_end]` must be a range previously returned (possibly
    /// itself already grown) by this arena. `min_new_end` must be `>= old_end`.
    #[inline]
    unsafe fn grow_in_place(
        &mut self,
        start: NonNull<u8>,
        old_end: NonNull<u8>,
        min_new_end: NonNull<u8>,
    ) -> Option<NonNull<u8>> {
        let _ = (start, old_end, min_new_end);
        None
    }

    /// Release a previously committed range back to the system.
    ///
    /// # Safety
    ///
    /// `[start, end]` must denote an existing commitment made by this arena.
    #[inline]
    unsafe fn decommit(&mut self, range: [NonNull<u8>; 2]) {
        let _ = range;
        debug_assert!(!self.supports_decommit(), "decommit not implemented");
    }

    /// Whether [`Self::decommit`] is actually implemented. If `false`,
    /// growable cores will never call it and will instead hold on to
    /// committed ranges for their own lifetime.
    #[inline]
    fn supports_decommit(&self) -> bool {
        false
    }

    /// The minimum alignment this arena guarantees for committed ranges.
    #[inline]
    fn min_align(&self) -> usize {
        1
    }
}

/// A [`VirtualArena`] backed by `std::alloc::System`, for tests and
/// host-side use.
#[cfg(feature = "std")]
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemVirtualArena<const ALIGN: usize>;

#[cfg(feature = "std")]
impl<const ALIGN: usize> SystemVirtualArena<ALIGN> {
    const ALIGN: usize = if ALIGN.is_power_of_two() { ALIGN } else { 16 };
}

#[cfg(feature = "std")]
unsafe impl<const ALIGN: usize> VirtualArena for SystemVirtualArena<ALIGN> {
    unsafe fn commit(&mut self, min_size: usize) -> Option<[NonNull<u8>; 2]> {
        let layout = Layout::from_size_align(min_size, Self::ALIGN)
            .ok()?
            .pad_to_align();
        let start = NonNull::new(std::alloc::alloc(layout))?;
        let end = NonNull::new(start.as_ptr().wrapping_add(layout.size()))?;
        Some([start, end])
    }

    unsafe fn decommit(&mut self, [start, end]: [NonNull<u8>; 2]) {
        let size = end.as_ptr() as usize - start.as_ptr() as usize;
        let layout = Layout::from_size_align_unchecked(size, Self::ALIGN);
        std::alloc::dealloc(start.as_ptr(), layout);
    }

    fn supports_decommit(&self) -> bool {
        true
    }

    fn min_align(&self) -> usize {
        Self::ALIGN
    }
}
