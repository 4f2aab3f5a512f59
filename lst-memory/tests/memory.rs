use lst_memory::{MemoryParams, ObjectMemory, Oop, UNIT_BYTES};

fn small_memory() -> ObjectMemory {
    ObjectMemory::with_params(MemoryParams {
        initial_size: 64,
        grow_amount: 32,
        max_size: 1024,
    })
}

#[test]
fn fresh_memory_only_holds_nil() {
    let mut memory = ObjectMemory::new();

    assert_eq!(memory.storage_size(), 6500);
    assert_eq!(memory.object_count(), 1);
    assert_eq!(memory.free_slot_count(), 6499);
    assert_eq!(memory.garbage_collect(), 0);
    assert_eq!(memory.object_count(), 1);
}

#[test]
fn unreachable_objects_are_collected() {
    let mut memory = ObjectMemory::new();

    for size in 0..5 {
        memory.allocate(size);
    }
    assert_eq!(memory.object_count(), 6);

    assert_eq!(memory.garbage_collect(), 5);
    assert_eq!(memory.object_count(), 1);
}

#[test]
fn allocation_sizes() {
    let mut memory = small_memory();

    let array = memory.allocate(7);
    assert_eq!(memory.size_of(array), 7);
    assert_eq!(memory.words(array), &[Oop::NIL; 7]);
    assert_eq!(memory.class_of(array), Oop::NIL);

    let bytes = memory.allocate_bytes(13);
    assert_eq!(memory.size_of(bytes), -13);
    assert!(memory.is_bytes(bytes));
    assert_eq!(memory.bytes(bytes), &[0u8; 13]);

    let text = memory.allocate_string("hello");
    assert_eq!(memory.size_of(text), -6);
    assert_eq!(memory.bytes(text), b"hello\0");
    assert_eq!(memory.string_value(text), "hello");
    assert!(memory.string_equals(text, "hello"));
    assert!(!memory.string_equals(text, "hell"));

    let empty = memory.allocate(0);
    assert_eq!(memory.size_of(empty), 0);
    assert!(memory.words(empty).is_empty());
}

#[test]
fn freed_slots_are_reused_by_exact_size() {
    let mut memory = small_memory();

    let first = memory.allocate(3);
    let _guard = memory.guard(first);
    let doomed = memory.allocate(4);
    let doomed_bytes = memory.allocate_bytes(4 * UNIT_BYTES);
    assert_eq!(memory.garbage_collect(), 2);

    let hits = memory.stats().exact_hits;
    let reused = memory.allocate(4);
    assert_eq!(memory.stats().exact_hits, hits + 1);
    assert!(reused == doomed || reused == doomed_bytes);
    assert_eq!(memory.words(reused), &[Oop::NIL; 4]);

    let reused_bytes = memory.allocate_bytes(4 * UNIT_BYTES - 3);
    assert_eq!(memory.stats().exact_hits, hits + 2);
    assert!(reused_bytes == doomed || reused_bytes == doomed_bytes);
    assert_ne!(reused, reused_bytes);
}

#[test]
fn collection_is_idempotent() {
    let mut memory = small_memory();

    let root = memory.allocate(2);
    let _guard = memory.guard(root);
    let child = memory.allocate(1);
    memory.basic_at_put(root, 1, child);
    for _ in 0..10 {
        memory.allocate(2);
    }

    assert_eq!(memory.garbage_collect(), 10);
    assert_eq!(memory.garbage_collect(), 0);
    assert_eq!(memory.object_count(), 3);
}

#[test]
fn guards_keep_objects_reachable() {
    let mut memory = small_memory();

    let root = memory.allocate(2);
    let child = memory.allocate(1);
    let shared = memory.allocate_string("shared");
    memory.basic_at_put(root, 1, child);
    memory.basic_at_put(root, 2, shared);
    memory.basic_at_put(child, 1, shared);

    let guard = memory.guard(root);
    assert_eq!(memory.handle_count(), 1);
    assert_eq!(memory.garbage_collect(), 0);
    assert!(memory.is_valid(root));
    assert!(memory.is_valid(child));

    // one reference per incoming edge, the guard counting as one
    assert_eq!(memory.reference_count(root), 1);
    assert_eq!(memory.reference_count(child), 1);
    assert_eq!(memory.reference_count(shared), 2);
    assert_eq!(memory.basic_at(memory.basic_at(root, 1), 1), shared);

    drop(guard);
    assert_eq!(memory.handle_count(), 0);
    assert_eq!(memory.garbage_collect(), 3);
    assert!(!memory.is_valid(root));
}

#[test]
fn cycles_are_traversed_once() {
    let mut memory = small_memory();

    let first = memory.allocate(1);
    let second = memory.allocate(1);
    memory.basic_at_put(first, 1, second);
    memory.basic_at_put(second, 1, first);
    memory.set_class(first, second);

    let _guard = memory.guard(first);
    assert_eq!(memory.garbage_collect(), 0);
    assert_eq!(memory.reference_count(first), 2);
    assert_eq!(memory.reference_count(second), 2);
}

#[test]
fn symbols_and_active_stack_are_roots() {
    let mut memory = small_memory();

    let symbols = memory.allocate(1);
    let stack = memory.allocate(3);
    let value = memory.allocate_string("kept");
    memory.basic_at_put(stack, 2, value);
    memory.set_symbols(symbols);
    memory.set_active_stack(stack);
    memory.allocate(5);

    assert_eq!(memory.garbage_collect(), 1);
    assert!(memory.is_valid(value));

    memory.set_active_stack(Oop::NIL);
    assert_eq!(memory.garbage_collect(), 2);
}

#[test]
fn the_table_grows_when_exhausted() {
    let mut memory = small_memory();
    let root = memory.allocate(100);
    let _guard = memory.guard(root);

    for idx in 1..=100 {
        let object = memory.allocate(1);
        memory.basic_at_put(root, idx, object);
    }

    assert!(memory.storage_size() > 64);
    assert!(memory.stats().table_growths >= 1);
    assert!(memory.stats().collections >= 1);
    assert_eq!(memory.object_count(), 102);
}

#[test]
fn disabled_collections_free_nothing() {
    let mut memory = small_memory();
    memory.allocate(1);
    memory.disable_gc(true);
    assert_eq!(memory.garbage_collect(), 0);
    memory.disable_gc(false);
    assert_eq!(memory.garbage_collect(), 1);
}

#[test]
fn small_integers_have_the_integer_class() {
    let mut memory = small_memory();
    let class = memory.allocate(5);
    memory.set_integer_class(class);

    assert_eq!(memory.class_of(Oop::from_integer(42)), class);
    assert_eq!(memory.size_of(Oop::from_integer(42)), 0);
}

#[test]
fn byte_access() {
    let mut memory = small_memory();
    let bytes = memory.allocate_bytes(3);
    memory.byte_at_put(bytes, 3, 200);
    assert_eq!(memory.byte_at(bytes, 3), 200);
    assert_eq!(memory.bytes(bytes), &[0u8, 0, 200]);
}

#[test]
#[should_panic(expected = "index out of range")]
fn basic_at_out_of_range_is_fatal() {
    let mut memory = small_memory();
    let array = memory.allocate(2);
    memory.basic_at(array, 3);
}

#[test]
#[should_panic(expected = "index out of range")]
fn basic_at_zero_is_fatal() {
    let mut memory = small_memory();
    let array = memory.allocate(2);
    memory.basic_at_put(array, 0, Oop::NIL);
}

#[test]
#[should_panic(expected = "index out of range")]
fn byte_at_past_the_end_is_fatal() {
    let mut memory = small_memory();
    let bytes = memory.allocate_bytes(4);
    memory.byte_at(bytes, 5);
}

#[test]
#[should_panic(expected = "object table exhausted")]
fn growing_past_the_maximum_is_fatal() {
    let mut memory = ObjectMemory::with_params(MemoryParams {
        initial_size: 8,
        grow_amount: 8,
        max_size: 16,
    });
    let root = memory.allocate(20);
    let _guard = memory.guard(root);
    for idx in 1..=20 {
        let object = memory.allocate(0);
        memory.basic_at_put(root, idx, object);
    }
}
