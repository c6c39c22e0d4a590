//! `TlsfCore`: constant-time two-level segregated fit over a single
//! caller-supplied memory pool.
//!
//! The mapping functions (`map_floor`/`map_ceil`), free-list linking, and
//! allocate/deallocate/reallocate bodies follow the classic TLSF paper's
//! structure. Added on top: an optional XOR-magic footer tag checked on
//! free, and a [`CorruptionHook`] invoked (instead of
//! `unreachable_unchecked`) when a checked invariant doesn't hold.
use core::{
    alloc::Layout,
    hint::unreachable_unchecked,
    marker::PhantomData,
    mem::{self, MaybeUninit},
    ptr::NonNull,
};

use crate::error::{default_corruption_hook, CorruptionHook};
use crate::int::BinInteger;

pub mod flex;
#[cfg(test)]
mod tests;

/// The allocation granularity: `size_of::<usize>() * 4` bytes, the minimum
/// size of a TLSF free block.
pub const GRANULARITY: usize = core::mem::size_of::<usize>() * 4;

const GRANULARITY_LOG2: u32 = GRANULARITY.trailing_zeros();
const USIZE_BITS: u32 = core::mem::size_of::<usize>() as u32 * 8;

/// The header of a memory block.
#[cfg_attr(target_pointer_width = "16", repr(align(4)))]
#[cfg_attr(target_pointer_width = "32", repr(align(8)))]
#[cfg_attr(target_pointer_width = "64", repr(align(16)))]
#[derive(Debug)]
struct BlockHdr {
    /// Size of the whole block including header. `bit[0]` = used,
    /// `bit[1]` = last-in-pool, `bit[GRANULARITY_LOG2..]` = size.
    size: usize,
    prev_phys_block: Option<NonNull<BlockHdr>>,
}

const SIZE_USED: usize = 1;
const SIZE_LAST_IN_POOL: usize = 2;
const SIZE_SIZE_MASK: usize = !((1 << GRANULARITY_LOG2) - 1);

impl BlockHdr {
    /// # Safety
    /// `self.size & SIZE_LAST_IN_POOL` must be telling the truth.
    #[inline]
    unsafe fn next_phys_block(&self) -> Option<NonNull<BlockHdr>> {
        if (self.size & SIZE_LAST_IN_POOL) != 0 {
            None
        } else {
            Some(
                NonNull::new_unchecked(
                    (self as *const _ as *mut u8).add(self.size & SIZE_SIZE_MASK),
                )
                .cast(),
            )
        }
    }
}

#[repr(C)]
#[cfg_attr(target_pointer_width = "16", repr(align(8)))]
#[cfg_attr(target_pointer_width = "32", repr(align(16)))]
#[cfg_attr(target_pointer_width = "64", repr(align(32)))]
#[derive(Debug)]
struct FreeBlockHdr {
    common: BlockHdr,
    next_free: Option<NonNull<FreeBlockHdr>>,
    prev_free: Option<NonNull<FreeBlockHdr>>,
}

/// The header of a used memory block, `GRANULARITY / 2` bytes long. The
/// payload immediately follows; if alignment requires it, the footer word at
/// `payload - usize` stores the block pointer and (when footers are
/// enabled) a second word stores `block_addr ^ magic` for corruption
/// detection on free.
#[repr(C)]
#[derive(Debug)]
struct UsedBlockHdr {
    common: BlockHdr,
}

#[cfg_attr(doc, svgbobdoc::transform)]
/// The TLSF header (top-level) data structure.
///
/// # Data Structure Overview
///
/// <center>
/// ```svgbob
///   First level
///                                                                       FLLEN = 8
///                               ,-----+-----+-----+-----+-----+-----+-----+-----,
///         fl_bitmap: FLBitmap = |  0  |  0  |  0  |  1  |  0  |  0  |  0  |  0  |
///                               +-----+-----+-----+-----+-----+-----+-----+-----+
///                      min size | 2¹¹ | 2¹⁰ |  2⁹ |  2⁸ |  2⁷ |  2⁶ |  2⁵ |  2⁴ |
///                               '-----+-----+-----+--+--+-----+-----+-----+-----'
///                                                    |
/// ╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶|╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶╶
///   Second level                                     |
///                                                    v                      SLLEN = 8
///                                  ,-----+-----+-----+-----+-----+-----+-----+-----,
///        "sl_bitmap[4]: SLBitmap"= |  0  |  0  |  1  |  0  |  0  |  0  |  0  |  0  |
///                                  +-----+-----+-----+-----+-----+-----+-----+-----+
///               min size 2⁸(1+n/8) |  7  |  6  |  5  |  4  |  3  |  2  |  1  |  0  |
///                                  +-----+-----+-----+-----+-----+-----+-----+-----+
///                       first_free |     |     |  O  |     |     |     |     |     |
///                                  '-----+-----+--|--+-----+-----+-----+-----+-----'
///                                                 |
/// ```
/// </center>
///
/// Every FREE block is linked into exactly one `first_free[fl][sl]` list,
/// found by [`Self::map_floor`]; `fl_bitmap`/`sl_bitmap` let
/// [`Self::search_suitable_free_block_list_for_allocation`] skip straight to
/// the next non-empty list in O(1) instead of scanning.
#[derive(Debug)]
pub struct TlsfCore<'pool, FLBitmap, SLBitmap, const FLLEN: usize, const SLLEN: usize> {
    fl_bitmap: FLBitmap,
    sl_bitmap: [SLBitmap; FLLEN],
    first_free: [[Option<NonNull<FreeBlockHdr>>; SLLEN]; FLLEN],
    /// XOR magic for footer corruption checks; `0` disables the check
    /// (footers are a cheap corruption detector, not a security boundary).
    footer_magic: usize,
    corruption_hook: CorruptionHook,
    _phantom: PhantomData<&'pool mut ()>,
}

// Safety: all memory block headers reachable from a `TlsfCore` are logically
// owned by it and have no interior mutability.
unsafe impl<FLBitmap, SLBitmap, const FLLEN: usize, const SLLEN: usize> Send
    for TlsfCore<'_, FLBitmap, SLBitmap, FLLEN, SLLEN>
{
}
unsafe impl<FLBitmap, SLBitmap, const FLLEN: usize, const SLLEN: usize> Sync
    for TlsfCore<'_, FLBitmap, SLBitmap, FLLEN, SLLEN>
{
}

impl<FLBitmap: BinInteger, SLBitmap: BinInteger, const FLLEN: usize, const SLLEN: usize> Default
    for TlsfCore<'_, FLBitmap, SLBitmap, FLLEN, SLLEN>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'pool, FLBitmap: BinInteger, SLBitmap: BinInteger, const FLLEN: usize, const SLLEN: usize>
    TlsfCore<'pool, FLBitmap, SLBitmap, FLLEN, SLLEN>
{
    /// An empty pool, with footers disabled and the default corruption hook.
    pub fn new() -> Self {
        assert!(FLLEN != 0, "FLLEN must not be zero");
        assert!(SLLEN != 0, "SLLEN must not be zero");
        assert!(
            FLBitmap::BITS as usize >= FLLEN,
            "FLBitmap must contain at least FLLEN bits"
        );
        assert!(
            SLBitmap::BITS as usize >= SLLEN,
            "SLBitmap must contain at least SLLEN bits"
        );
        assert!(SLLEN.is_power_of_two(), "SLLEN must be a power of two");
        Self {
            fl_bitmap: FLBitmap::ZERO,
            sl_bitmap: [SLBitmap::ZERO; FLLEN],
            first_free: [[None; SLLEN]; FLLEN],
            footer_magic: 0,
            corruption_hook: default_corruption_hook,
            _phantom: PhantomData,
        }
    }

    /// Enable footer tags XOR'd with `magic` (non-zero). Checked on every
    /// `deallocate`/`reallocate`.
    pub fn with_footer_magic(mut self, magic: usize) -> Self {
        self.footer_magic = magic;
        self
    }

    /// Install a custom corruption hook.
    pub fn with_corruption_hook(mut self, hook: CorruptionHook) -> Self {
        self.corruption_hook = hook;
        self
    }

    const MAX_POOL_SIZE: Option<usize> = {
        let shift = GRANULARITY_LOG2 + FLLEN as u32;
        if shift < USIZE_BITS {
            Some((1 << shift) - GRANULARITY)
        } else if shift == USIZE_BITS {
            Some(0usize.wrapping_sub(GRANULARITY))
        } else {
            None
        }
    };

    const SLI: u32 = SLLEN.trailing_zeros();

    #[inline]
    fn map_floor(size: usize) -> Option<(usize, usize)> {
        debug_assert!(size >= GRANULARITY && size % GRANULARITY == 0);
        let fl = USIZE_BITS - GRANULARITY_LOG2 - 1 - size.leading_zeros();
        let sl = if GRANULARITY_LOG2 < Self::SLI && fl < Self::SLI - GRANULARITY_LOG2 {
            size << ((Self::SLI - GRANULARITY_LOG2) - fl)
        } else {
            size >> (fl + GRANULARITY_LOG2 - Self::SLI)
        };
        if fl as usize >= FLLEN {
            return None;
        }
        Some((fl as usize, sl & (SLLEN - 1)))
    }

    #[inline]
    fn map_ceil(size: usize) -> Option<(usize, usize)> {
        debug_assert!(size >= GRANULARITY && size % GRANULARITY == 0);
        let mut fl = USIZE_BITS - GRANULARITY_LOG2 - 1 - size.leading_zeros();
        let sl = if GRANULARITY_LOG2 < Self::SLI && fl < Self::SLI - GRANULARITY_LOG2 {
            size << ((Self::SLI - GRANULARITY_LOG2) - fl)
        } else {
            let mut sl = size >> (fl + GRANULARITY_LOG2 - Self::SLI);
            sl += (sl << (fl + GRANULARITY_LOG2 - Self::SLI) != size) as usize;
            fl += (sl >> (Self::SLI + 1)) as u32;
            sl
        };
        if fl as usize >= FLLEN {
            return None;
        }
        Some((fl as usize, sl & (SLLEN - 1)))
    }

    /// # Safety
    /// `block` must be owned by `self`; `size`'s free list must not already
    /// contain `block`.
    unsafe fn link_free_block(&mut self, mut block: NonNull<FreeBlockHdr>, size: usize) {
        let (fl, sl) = Self::map_floor(size).unwrap_or_else(|| unreachable_unchecked());
        let first_free = &mut self.first_free[fl][sl];
        let next_free = mem::replace(first_free, Some(block));
        block.as_mut().next_free = next_free;
        block.as_mut().prev_free = None;
        if let Some(mut next_free) = next_free {
            next_free.as_mut().prev_free = Some(block);
        }
        self.fl_bitmap.set_bit(fl as u32);
        self.sl_bitmap[fl].set_bit(sl as u32);
    }

    /// # Safety
    /// `size` must be the block's actual size; the block must currently be
    /// linked in the corresponding free list.
    unsafe fn unlink_free_block(&mut self, mut block: NonNull<FreeBlockHdr>, size: usize) {
        let next_free = block.as_mut().next_free;
        let prev_free = block.as_mut().prev_free;
        if let Some(mut next_free) = next_free {
            next_free.as_mut().prev_free = prev_free;
        }
        if let Some(mut prev_free) = prev_free {
            prev_free.as_mut().next_free = next_free;
        } else {
            let (fl, sl) = Self::map_floor(size).unwrap_or_else(|| unreachable_unchecked());
            let first_free = &mut self.first_free[fl][sl];
            if *first_free != Some(block) {
                (self.corruption_hook)("free list head mismatch during unlink");
                return;
            }
            *first_free = next_free;
            if next_free.is_none() {
                self.sl_bitmap[fl].clear_bit(sl as u32);
                if self.sl_bitmap[fl] == SLBitmap::ZERO {
                    self.fl_bitmap.clear_bit(fl as u32);
                }
            }
        }
    }

    /// Insert a new free memory block into the pool via a slice pointer.
    /// Does nothing if the block is too small. Linear in `block.len()`
    /// because oversized blocks are split to respect `MAX_POOL_SIZE`.
    ///
    /// # Safety
    /// The memory block becomes owned by `self` and must outlive it.
    pub unsafe fn insert_free_block_ptr(&mut self, block: NonNull<[u8]>) {
        let len = (*(block.as_ptr() as *const [MaybeUninit<u8>])).len();
        let unaligned_start = block.as_ptr() as *mut u8 as usize;
        let start = unaligned_start.wrapping_add(GRANULARITY - 1) & !(GRANULARITY - 1);

        let mut size = if let Some(x) = len
            .checked_sub(start.wrapping_sub(unaligned_start))
            .filter(|&x| x >= GRANULARITY)
        {
            x & !(GRANULARITY - 1)
        } else {
            return;
        };

        let mut start = start;
        while size > 0 {
            let chunk_size = if let Some(max_pool_size) = Self::MAX_POOL_SIZE {
                size.min(max_pool_size)
            } else {
                size
            };

            let mut block = NonNull::new_unchecked(start as *mut FreeBlockHdr);
            block.as_mut().common = BlockHdr {
                size: chunk_size | SIZE_LAST_IN_POOL,
                prev_phys_block: None,
            };
            self.link_free_block(block, chunk_size);

            size -= chunk_size;
            start += chunk_size;
        }
    }

    /// Insert a new free memory block via a slice reference.
    #[inline]
    pub fn insert_free_block(&mut self, block: &'pool mut [MaybeUninit<u8>]) {
        unsafe { self.insert_free_block_ptr(NonNull::new(block as *mut [_] as _).unwrap()) };
    }

    /// Attempt to allocate a block of memory. Completes in constant time.
    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        if !layout.align().is_power_of_two() {
            return None;
        }
        unsafe { self.allocate_initializing_by(layout, |_| {}) }
    }

    #[inline]
    unsafe fn allocate_initializing_by(
        &mut self,
        layout: Layout,
        initer: impl FnOnce(NonNull<u8>),
    ) -> Option<NonNull<u8>> {
        let footer_words = if self.footer_magic != 0 { 1 } else { 0 };
        let max_overhead = layout.align().saturating_sub(GRANULARITY / 2)
            + mem::size_of::<UsedBlockHdr>()
            + footer_words * mem::size_of::<usize>();

        let search_size = layout.size().checked_add(max_overhead)?;
        let search_size = search_size.checked_add(GRANULARITY - 1)? & !(GRANULARITY - 1);
        let (fl, sl) = self.search_suitable_free_block_list_for_allocation(search_size)?;

        let first_free = &mut self.first_free[fl][sl];
        let block = first_free.unwrap_or_else(|| unreachable_unchecked());
        let next_phys_block = block.as_ref().common.next_phys_block();
        let size_and_flags = block.as_ref().common.size;

        if let Some(mut next_free) = block.as_ref().next_free {
            next_free.as_mut().prev_free = None;
            *first_free = Some(next_free);
        } else {
            self.sl_bitmap[fl].clear_bit(sl as u32);
            if self.sl_bitmap[fl] == SLBitmap::ZERO {
                self.fl_bitmap.clear_bit(fl as u32);
            }
        }

        let unaligned_ptr = block.as_ptr() as *mut u8 as usize + mem::size_of::<UsedBlockHdr>();
        let ptr = NonNull::new_unchecked(
            (unaligned_ptr.wrapping_add(layout.align() - 1) & !(layout.align() - 1)) as *mut u8,
        );

        initer(ptr);

        if layout.align() >= GRANULARITY {
            *ptr.cast::<NonNull<UsedBlockHdr>>().as_ptr().sub(1) = block.cast();
        }
        if footer_words > 0 {
            let tag = (block.as_ptr() as usize) ^ self.footer_magic;
            *ptr.as_ptr().cast::<usize>().sub(1 + if layout.align() >= GRANULARITY { 1 } else { 0 }) = tag;
        }

        let overhead = ptr.as_ptr() as usize - block.as_ptr() as usize;
        let new_size = overhead + layout.size();
        let new_size = (new_size + GRANULARITY - 1) & !(GRANULARITY - 1);
        let new_size_and_flags;

        if new_size == size_and_flags & !SIZE_LAST_IN_POOL {
            new_size_and_flags = size_and_flags;
        } else {
            let mut new_free_block: NonNull<FreeBlockHdr> =
                NonNull::new_unchecked(block.cast::<u8>().as_ptr().add(new_size)).cast();
            let new_free_block_size_and_flags = size_and_flags - new_size;

            if let Some(mut next_phys_block) = next_phys_block {
                next_phys_block.as_mut().prev_phys_block = Some(new_free_block.cast());
            }

            new_free_block.as_mut().common = BlockHdr {
                size: new_free_block_size_and_flags,
                prev_phys_block: Some(block.cast()),
            };
            self.link_free_block(
                new_free_block,
                new_free_block_size_and_flags & SIZE_SIZE_MASK,
            );

            new_size_and_flags = new_size;
        }

        let mut block = block.cast::<UsedBlockHdr>();
        block.as_mut().common.size = new_size_and_flags | SIZE_USED;

        Some(ptr)
    }

    #[inline]
    fn search_suitable_free_block_list_for_allocation(
        &self,
        min_size: usize,
    ) -> Option<(usize, usize)> {
        let (mut fl, mut sl) = Self::map_ceil(min_size)?;
        sl = self.sl_bitmap[fl].bit_scan_forward(sl as u32) as usize;
        if sl < SLLEN {
            return Some((fl, sl));
        }
        fl = self.fl_bitmap.bit_scan_forward(fl as u32 + 1) as usize;
        if fl < FLLEN {
            sl = self.sl_bitmap[fl].trailing_zeros() as usize;
            if sl >= SLLEN {
                return None;
            }
            Some((fl, sl))
        } else {
            None
        }
    }

    #[inline]
    unsafe fn used_block_hdr_for_allocation(
        &self,
        ptr: NonNull<u8>,
        align: usize,
    ) -> Option<NonNull<UsedBlockHdr>> {
        let block = if align >= GRANULARITY {
            *ptr.cast::<NonNull<UsedBlockHdr>>().as_ptr().sub(1)
        } else {
            NonNull::new_unchecked(ptr.as_ptr().sub(GRANULARITY / 2)).cast()
        };
        if self.footer_magic != 0 {
            let tag_offset = 1 + if align >= GRANULARITY { 1 } else { 0 };
            let tag = *ptr.as_ptr().cast::<usize>().sub(tag_offset);
            if tag != (block.as_ptr() as usize) ^ self.footer_magic {
                (self.corruption_hook)("footer tag mismatch");
                return None;
            }
        }
        Some(block)
    }

    /// Deallocate a previously allocated memory block. Constant time.
    ///
    /// # Safety
    /// `ptr` must denote a block allocated by `self` with alignment `align`.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, align: usize) {
        let block = match self.used_block_hdr_for_allocation(ptr, align) {
            Some(b) => b,
            None => return,
        };
        let mut block = block.cast::<BlockHdr>();
        if (block.as_ref().size & SIZE_USED) == 0 {
            (self.corruption_hook)("double free detected");
            return;
        }
        let mut size = block.as_ref().size & !SIZE_USED;

        let new_next_phys_block;
        if let Some(next_phys_block) = block.as_ref().next_phys_block() {
            let next_phys_block_size = next_phys_block.as_ref().size;
            if (next_phys_block_size & SIZE_USED) == 0 {
                size += next_phys_block_size;
                new_next_phys_block = next_phys_block.as_ref().next_phys_block();
                self.unlink_free_block(next_phys_block.cast(), next_phys_block_size & SIZE_SIZE_MASK);
            } else {
                new_next_phys_block = Some(next_phys_block);
            }
        } else {
            new_next_phys_block = None;
        }

        if let Some(prev_phys_block) = block.as_ref().prev_phys_block {
            let prev_phys_block_size = prev_phys_block.as_ref().size;
            if (prev_phys_block_size & SIZE_USED) == 0 {
                size += prev_phys_block_size;
                self.unlink_free_block(prev_phys_block.cast(), prev_phys_block_size);
                block = prev_phys_block;
            }
        }

        block.as_mut().size = size;
        let block = block.cast::<FreeBlockHdr>();
        self.link_free_block(block, size & !SIZE_LAST_IN_POOL);

        if let Some(mut new_next_phys_block) = new_next_phys_block {
            new_next_phys_block.as_mut().prev_phys_block = Some(block.cast());
        }
    }

    /// Usable payload size for a previously allocated block.
    ///
    /// # Safety
    /// Same requirements as [`Self::deallocate`].
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>, align: usize) -> Option<usize> {
        let block = self.used_block_hdr_for_allocation(ptr, align)?;
        let overhead = ptr.as_ptr() as usize - block.as_ptr() as usize;
        let size = block.as_ref().common.size & SIZE_SIZE_MASK;
        Some(size - overhead)
    }

    /// Shrink or grow a previously allocated memory block, possibly moving
    /// it. `O(old_size)` in the worst case (copying on move).
    ///
    /// # Safety
    /// Same requirements as [`Self::deallocate`], plus `new_layout.align()`
    /// must equal the alignment used at allocation time.
    pub unsafe fn reallocate(
        &mut self,
        ptr: NonNull<u8>,
        new_layout: Layout,
    ) -> Option<NonNull<u8>> {
        let new_size = new_layout.size().checked_add(GRANULARITY - 1)? & !(GRANULARITY - 1);
        let new_layout = Layout::from_size_align_unchecked(new_size, new_layout.align());

        let old_size = self.usable_size(ptr, new_layout.align())?;

        let mut head: MaybeUninit<[usize; 2]> = MaybeUninit::uninit();
        core::ptr::copy_nonoverlapping(
            ptr.as_ptr(),
            head.as_mut_ptr() as *mut u8,
            GRANULARITY / 2,
        );

        self.deallocate(ptr, new_layout.align());

        let copy_len = old_size.min(new_layout.size());
        self.allocate_initializing_by(new_layout, |new_alloc| {
            if copy_len > mem::size_of::<[usize; 2]>() {
                core::ptr::copy(
                    ptr.as_ptr().add(mem::size_of::<[usize; 2]>()),
                    new_alloc.as_ptr().add(mem::size_of::<[usize; 2]>()),
                    copy_len - mem::size_of::<[usize; 2]>(),
                );
            }
            core::ptr::copy(
                head.as_ptr() as *const u8,
                new_alloc.as_ptr(),
                copy_len.min(mem::size_of::<[usize; 2]>()),
            );
        })
    }

    /// Forget all bookkeeping. The backing
    /// pool itself is owned by the caller and is not touched; calling
    /// [`Self::insert_free_block`] again is required before further use.
    pub fn release(&mut self) {
        self.fl_bitmap = FLBitmap::ZERO;
        self.sl_bitmap = [SLBitmap::ZERO; FLLEN];
        self.first_free = [[None; SLLEN]; FLLEN];
    }
}
