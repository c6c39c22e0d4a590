//! Error taxonomy shared by every core.
//!
//! `allocate`-style methods keep returning plain `Option<NonNull<u8>>` (or
//! `None`/`null` equivalents) for the **out of memory** and **invalid
//! argument** cases, matching `TlsfCore::allocate`'s signature. The richer
//! contracts (`OffsetCore`, `SegmentedCore`, `TSPlanner`) use [`AllocError`]
//! where "why did this fail" is actionable by the caller.
//!
//! **Corruption** and **usage** errors are, by policy, not recoverable: they
//! are routed through [`CorruptionHook`]/[`UsageErrorHook`] function pointers
//! instead of `unreachable_unchecked`, so that a caller who configures one
//! observes the failure instead of hitting undefined behavior silently.

/// The recoverable error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The request could not be satisfied with the memory currently available
    /// to the core (and, for growable cores, growing the backing store also
    /// failed).
    OutOfMemory,
    /// `align` was not a power of two, or `size` exceeded the core's
    /// `MAX_REQUEST`.
    InvalidArgument,
    /// A capacity-bounded structure (e.g. [`crate::segmented::SegmentedAllocator`],
    /// [`crate::ecs::ObjectComponentStore`]) has no free slot for the
    /// request, independent of byte-level free space.
    Capacity,
}

/// Called when a core detects that its invariants have been violated (bad
/// footer, a neighbor pointer out of range, a free-list/bitmap mismatch, a
/// misaligned block). Fatal by default.
pub type CorruptionHook = fn(&'static str);

/// Called when a core detects caller misuse (freeing a pointer this core did
/// not produce, a double free). Fatal by default.
pub type UsageErrorHook = fn(&'static str);

/// The default [`CorruptionHook`]: logs via `log` (when available) and
/// panics in debug builds; in release builds without `debug_assertions` it
/// only logs, for invariants that are too expensive to check
/// unconditionally.
#[cfg_attr(not(feature = "std"), allow(unused_variables))]
pub fn default_corruption_hook(msg: &'static str) {
    #[cfg(feature = "std")]
    log::error!("polyalloc: corruption detected: {msg}");
    #[cfg(debug_assertions)]
    panic!("polyalloc: corruption detected: {msg}");
}

/// The default [`UsageErrorHook`]: same policy as [`default_corruption_hook`].
#[cfg_attr(not(feature = "std"), allow(unused_variables))]
pub fn default_usage_error_hook(msg: &'static str) {
    #[cfg(feature = "std")]
    log::error!("polyalloc: usage error: {msg}");
    #[cfg(debug_assertions)]
    panic!("polyalloc: usage error: {msg}");
}
