//! `polyalloc` bundles a dozen collaborating memory-allocation algorithms
//! behind one abstract contract, so that higher layers can pick a policy
//! per use-site without changing call sites:
//!
//!  - [`tlsf`]: constant-time two-level segregated fit over a caller-supplied
//!    pool, plus [`tlsf::flex`] for a growable variant backed by a
//!    [`arena::VirtualArena`].
//!  - [`offset`]: the same two-level-bitmap search, but over offsets into a
//!    virtual range instead of pointers — suited to GPU/VM management.
//!  - [`dlmalloc`]: small-bin rings plus size-keyed trees, multi-segment.
//!  - [`segmented`]: a power-of-two buddy allocator over bitmap cascades.
//!  - [`bump`]: monotonic, ring-forward, LIFO-scoped, and frame-lane
//!    bump-pointer cores.
//!  - [`ecs`]: an archetype-free object/component/tag store.
//!  - [`ts_planner`]: an offline planner that assigns addresses to a known
//!    allocation schedule, minimizing peak footprint.
//!
//! # Example
//!
//! ```rust
//! use core::alloc::Layout;
//! use core::mem::MaybeUninit;
//! use polyalloc::tlsf::TlsfCore;
//!
//! let mut pool = [MaybeUninit::uninit(); 65536];
//! let mut tlsf: TlsfCore<'_, u16, u16, 12, 16> = TlsfCore::new();
//! tlsf.insert_free_block(&mut pool);
//!
//! unsafe {
//!     let ptr = tlsf.allocate(Layout::new::<u64>()).unwrap();
//!     tlsf.deallocate(ptr, Layout::new::<u64>().align());
//! }
//! ```
//!
//! # Scope
//!
//! Multi-threaded locking policy, the thin `freelist`/`fsadexed_array`/
//! `resource_pool` style tutorial wrappers, debug leak tracking, and OS-level
//! virtual memory acquisition are all out of scope; the latter is
//! represented only by the [`arena::VirtualArena`] collaborator trait, left
//! for a caller to implement.
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod arena;
pub mod bitset;
pub mod bump;
pub mod dlmalloc;
pub mod ecs;
pub mod error;
pub mod int;
pub mod offset;
pub mod segmented;
pub mod tlsf;
pub mod ts_planner;

mod utils;
