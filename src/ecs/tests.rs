use super::*;
use crate::arena::SystemVirtualArena;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

fn new_store() -> ObjectComponentStore<SystemVirtualArena<16>> {
    ObjectComponentStore::new(SystemVirtualArena::default())
}

#[test]
fn create_destroy_recycles_instance_slots() {
    let mut store = new_store();
    let ty = store.register_object(4, 1, 1);

    let a = store.create_object(ty).unwrap();
    let b = store.create_object(ty).unwrap();
    let c = store.create_object(ty).unwrap();
    let d = store.create_object(ty).unwrap();
    assert!(store.create_object(ty).is_err());

    store.destroy_object(ty, b);
    let e = store.create_object(ty).unwrap();
    assert_eq!(e, b);

    let _ = (a, c, d);
}

#[test]
fn add_get_rem_component_round_trips_through_redirection() {
    let mut store = new_store();
    let ty = store.register_object(8, 2, 0);
    store
        .register_component_for_object(ty, 0, 8, core::mem::size_of::<Position>(), core::mem::align_of::<Position>())
        .unwrap();

    let obj = store.create_object(ty).unwrap();
    assert!(!store.has_component(ty, obj, 0));

    let ptr = store.add_component(ty, obj, 0).unwrap();
    unsafe { ptr.cast::<Position>().as_ptr().write(Position { x: 1.0, y: 2.0 }) };
    assert!(store.has_component(ty, obj, 0));

    let fetched = store.get_component(ty, obj, 0).unwrap();
    let value = unsafe { fetched.cast::<Position>().as_ptr().read() };
    assert_eq!(value, Position { x: 1.0, y: 2.0 });

    store.rem_component(ty, obj, 0);
    assert!(!store.has_component(ty, obj, 0));
    assert!(store.get_component(ty, obj, 0).is_none());
}

#[test]
fn destroy_object_releases_its_components() {
    let mut store = new_store();
    let ty = store.register_object(4, 1, 0);
    store
        .register_component_for_object(ty, 0, 4, core::mem::size_of::<u32>(), core::mem::align_of::<u32>())
        .unwrap();

    let obj = store.create_object(ty).unwrap();
    store.add_component(ty, obj, 0).unwrap();
    assert!(store.has_component(ty, obj, 0));

    store.destroy_object(ty, obj);
    let reused = store.create_object(ty).unwrap();
    assert_eq!(reused, obj);
    assert!(!store.has_component(ty, reused, 0));
}

#[test]
fn tag_bits_set_clear_and_query_independently() {
    let mut store = new_store();
    let ty = store.register_object(2, 0, 40);
    let obj = store.create_object(ty).unwrap();

    assert!(!store.has_tag(ty, obj, 0));
    assert!(!store.has_tag(ty, obj, 33));

    store.add_tag(ty, obj, 0);
    store.add_tag(ty, obj, 33);
    assert!(store.has_tag(ty, obj, 0));
    assert!(store.has_tag(ty, obj, 33));
    assert!(!store.has_tag(ty, obj, 1));

    store.rem_tag(ty, obj, 0);
    assert!(!store.has_tag(ty, obj, 0));
    assert!(store.has_tag(ty, obj, 33));
}

#[test]
fn destroy_object_clears_tags_for_reused_slot() {
    let mut store = new_store();
    let ty = store.register_object(1, 0, 8);
    let obj = store.create_object(ty).unwrap();
    store.add_tag(ty, obj, 3);
    store.destroy_object(ty, obj);

    let reused = store.create_object(ty).unwrap();
    assert_eq!(reused, obj);
    assert!(!store.has_tag(ty, reused, 3));
}

#[test]
fn iterate_walks_live_instances_in_ascending_order() {
    let mut store = new_store();
    let ty = store.register_object(8, 0, 0);
    let a = store.create_object(ty).unwrap();
    let b = store.create_object(ty).unwrap();
    let c = store.create_object(ty).unwrap();
    store.destroy_object(ty, b);

    let mut seen = Vec::new();
    let mut cur = store.iterate_begin(ty);
    while let Some(instance) = cur {
        seen.push(instance);
        cur = store.iterate_next(ty, instance);
    }
    assert_eq!(seen, vec![a, c]);
}

#[test]
fn get_number_of_instances_reports_registered_capacity() {
    let mut store = new_store();
    let ty = store.register_object(16, 0, 0);
    assert_eq!(store.get_number_of_instances(ty), 16);
}

#[test]
fn teardown_releases_component_storage() {
    let mut store = new_store();
    let ty = store.register_object(4, 1, 0);
    store
        .register_component_for_object(ty, 0, 4, 32, 8)
        .unwrap();
    let obj = store.create_object(ty).unwrap();
    store.add_component(ty, obj, 0).unwrap();
    store.teardown(ty);
    assert_eq!(store.get_number_of_instances(ty), 0);
}
