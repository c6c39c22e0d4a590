use super::*;
use core::mem::MaybeUninit;
use std::vec;
use std::vec::Vec;

type T = TlsfCore<'static, u32, u32, 28, 16>;

#[test]
fn seed_scenario_256mib_roundtrip() {
    const POOL_SIZE: usize = 256 * 1024 * 1024;
    let pool = unsafe {
        let layout = Layout::from_size_align(POOL_SIZE, 4096).unwrap();
        let ptr = std::alloc::alloc(layout);
        core::slice::from_raw_parts_mut(ptr as *mut MaybeUninit<u8>, POOL_SIZE)
    };
    let mut t: T = TlsfCore::new();
    t.insert_free_block(pool);

    let a = t
        .allocate(Layout::from_size_align(512, 8).unwrap())
        .unwrap();
    let b = t
        .allocate(Layout::from_size_align(1024, 16).unwrap())
        .unwrap();
    let c = t
        .allocate(Layout::from_size_align(256, 32).unwrap())
        .unwrap();
    unsafe {
        t.deallocate(b, 16);
        t.deallocate(a, 8);
        t.deallocate(c, 32);
    }

    // Every outstanding allocation has been returned: a large enough
    // allocation covering virtually the whole pool must now succeed.
    let whole = t.allocate(Layout::from_size_align(POOL_SIZE / 2, 8).unwrap());
    assert!(whole.is_some());

    unsafe { std::alloc::dealloc(pool.as_mut_ptr() as *mut u8, Layout::from_size_align(POOL_SIZE, 4096).unwrap()) };
}

#[test]
fn alignment_is_respected() {
    let mut backing = vec![MaybeUninit::uninit(); 1 << 20];
    let mut t: T = TlsfCore::new();
    t.insert_free_block(&mut backing);

    for &align in &[8usize, 16, 64, 256, 4096] {
        let p = t
            .allocate(Layout::from_size_align(100, align).unwrap())
            .unwrap();
        assert_eq!(p.as_ptr() as usize % align, 0);
        unsafe { t.deallocate(p, align) };
    }
}

#[test]
fn no_two_free_blocks_are_neighbors_after_random_ops() {
    let mut backing = vec![MaybeUninit::uninit(); 1 << 16];
    let mut t: T = TlsfCore::new();
    t.insert_free_block(&mut backing);

    let mut live = Vec::new();
    let sizes = [16usize, 32, 64, 128, 48, 96, 200];
    for &s in sizes.iter().cycle().take(40) {
        if let Some(p) = t.allocate(Layout::from_size_align(s, 8).unwrap()) {
            live.push((p, s));
        } else if let Some((p, s)) = live.pop() {
            unsafe { t.deallocate(p, 8) };
            let _ = s;
        }
    }
    for (p, _) in live {
        unsafe { t.deallocate(p, 8) };
    }
    // If coalescing were broken, this exact-sized allocation covering the
    // whole original pool would now fail due to residual fragmentation.
    let whole = t.allocate(Layout::from_size_align((1 << 16) - 4096, 8).unwrap());
    assert!(whole.is_some());
}

#[test]
fn footer_magic_detects_nothing_on_well_behaved_use() {
    let mut backing = vec![MaybeUninit::uninit(); 1 << 16];
    let mut t: T = TlsfCore::new().with_footer_magic(0xDEAD_BEEF);
    t.insert_free_block(&mut backing);

    let p = t.allocate(Layout::from_size_align(64, 8).unwrap()).unwrap();
    unsafe { t.deallocate(p, 8) };
}

#[test]
fn reallocate_grows_in_place_when_possible() {
    let mut backing = vec![MaybeUninit::uninit(); 1 << 16];
    let mut t: T = TlsfCore::new();
    t.insert_free_block(&mut backing);

    let p = t.allocate(Layout::from_size_align(64, 8).unwrap()).unwrap();
    unsafe {
        *p.as_ptr() = 0x42;
    }
    let p2 = unsafe { t.reallocate(p, Layout::from_size_align(512, 8).unwrap()) }.unwrap();
    assert_eq!(unsafe { *p2.as_ptr() }, 0x42);
    unsafe { t.deallocate(p2, 8) };
}

mod quickcheck_props {
    use super::*;
    use quickcheck_macros::quickcheck;

    /// Replays `ops` as a fuzzed sequence of allocate/deallocate decisions
    /// against a single pool, checking the universal properties every core
    /// must hold: every returned pointer honors the requested alignment, no
    /// two live allocations ever overlap, and once every allocation has been
    /// returned the pool is fully reusable again (no leftover, un-coalesced
    /// free blocks).
    fn random_ops_round_trip(ops: Vec<u8>) {
        let _ = env_logger::builder().is_test(true).try_init();
        const POOL_SIZE: usize = 1 << 16;
        let mut backing = vec![MaybeUninit::uninit(); POOL_SIZE];
        let base = backing.as_ptr() as usize;
        let mut t: T = TlsfCore::new();
        t.insert_free_block(&mut backing);

        // Byte-granularity shadow of the pool: `true` where some live
        // allocation currently claims that byte.
        let mut shadow = vec![false; POOL_SIZE];
        let mut live: Vec<(NonNull<u8>, usize, usize)> = Vec::new();

        let mut it = ops.iter().copied();
        while let Some(op) = it.next() {
            if op % 2 == 0 || live.is_empty() {
                let size_byte = match it.next() {
                    Some(b) => b,
                    None => break,
                };
                let size = (size_byte as usize) * 16 + 1;
                let align = 1usize << ((op / 2) % 5);
                let layout = Layout::from_size_align(size, align).unwrap();
                if let Some(p) = t.allocate(layout) {
                    assert_eq!(
                        p.as_ptr() as usize % align,
                        0,
                        "allocate() returned a pointer misaligned to the requested alignment"
                    );
                    let offset = p.as_ptr() as usize - base;
                    assert!(offset + size <= POOL_SIZE);
                    for used in &mut shadow[offset..offset + size] {
                        assert!(!*used, "allocate() handed out already-live memory");
                        *used = true;
                    }
                    live.push((p, size, align));
                }
            } else {
                let idx = (op as usize / 2) % live.len();
                let (p, size, align) = live.remove(idx);
                let offset = p.as_ptr() as usize - base;
                for used in &mut shadow[offset..offset + size] {
                    *used = false;
                }
                unsafe { t.deallocate(p, align) };
            }
        }

        for (p, _size, align) in live {
            unsafe { t.deallocate(p, align) };
        }

        // Every allocation has now been returned: a near-whole-pool request
        // must succeed, proving the fuzzed sequence left no fragmentation
        // behind (no two free blocks stayed un-coalesced).
        let whole = t.allocate(Layout::from_size_align(POOL_SIZE - 4096, 8).unwrap());
        assert!(whole.is_some());
    }

    #[quickcheck]
    fn fuzzed_allocate_deallocate_sequences_round_trip(ops: Vec<u8>) {
        random_ops_round_trip(ops);
    }
}
