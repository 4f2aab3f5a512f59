use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};

use lst_memory::{ImageError, MemoryParams, ObjectMemory, Oop, PrimitiveTableId};

const CORE_TABLE: PrimitiveTableId =
    PrimitiveTableId::from_u128(0x6c73_7400_636f_7265_0000_0000_0000_0001);

/// Three classes with metaclasses, five instances, all hanging off a symbol array.
fn populate(memory: &mut ObjectMemory) -> Vec<Oop> {
    let symbols = memory.allocate(8);
    memory.set_symbols(symbols);

    let mut classes = Vec::new();
    for (idx, name) in ["Point", "Pair", "Label"].iter().enumerate() {
        let class = memory.allocate(5);
        let metaclass = memory.allocate(5);
        let name = memory.allocate_string(name);
        memory.basic_at_put(class, 1, name);
        memory.basic_at_put(class, 2, Oop::from_integer(2));
        memory.set_class(class, metaclass);
        // the metaclass points back at its sole instance
        memory.basic_at_put(metaclass, 5, class);
        memory.basic_at_put(symbols, idx + 1, class);
        classes.push(class);
    }
    memory.basic_at_put(classes[1], 4, classes[0]);

    let mut instances = Vec::new();
    for idx in 0..5 {
        let instance = memory.allocate(2);
        memory.set_class(instance, classes[idx % 3]);
        memory.basic_at_put(instance, 1, Oop::from_integer(idx as i64 * 10));
        instances.push(instance);
    }
    let label = memory.allocate_string("label text");
    memory.basic_at_put(instances[2], 2, label);
    memory.basic_at_put(instances[3], 2, instances[4]);
    let float = memory.allocate_bytes(8);
    memory.bytes_mut(float).copy_from_slice(&2.5f64.to_ne_bytes());
    memory.basic_at_put(instances[4], 2, float);

    // the last instance is only reachable through the fourth one
    for (idx, instance) in instances[..4].iter().enumerate() {
        memory.basic_at_put(symbols, 4 + idx, *instance);
    }

    // some garbage that must not make it into the image
    for _ in 0..10 {
        memory.allocate(3);
    }

    let mut all = classes;
    all.extend(instances);
    all
}

fn assert_same_object(left: &ObjectMemory, right: &ObjectMemory, oop: Oop) {
    assert_eq!(left.class_of(oop), right.class_of(oop), "class of {:?}", oop);
    assert_eq!(left.size_of(oop), right.size_of(oop), "size of {:?}", oop);
    if left.is_bytes(oop) {
        assert_eq!(left.bytes(oop), right.bytes(oop));
    } else {
        assert_eq!(left.words(oop), right.words(oop));
    }
}

#[test]
fn image_round_trip() {
    let mut memory = ObjectMemory::new();
    let objects = populate(&mut memory);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("round-trip.image");
    {
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        memory.write_image(&mut writer, &[CORE_TABLE]).unwrap();
    }
    assert_eq!(memory.garbage_collect(), 0);

    let mut loaded = ObjectMemory::new();
    let mut reader = BufReader::new(File::open(&path).unwrap());
    let info = loaded.read_image(&mut reader).unwrap();

    assert_eq!(info.primitive_tables, vec![CORE_TABLE]);
    assert_eq!(info.allocation_serial, memory.allocation_serial());
    assert_eq!(info.object_count, memory.object_count());
    assert_eq!(loaded.symbols(), memory.symbols());
    assert_eq!(loaded.object_count(), memory.object_count());

    assert_same_object(&memory, &loaded, memory.symbols());
    for oop in objects {
        assert_same_object(&memory, &loaded, oop);
        let class = memory.class_of(oop);
        assert_same_object(&memory, &loaded, class);
    }

    let point = loaded.basic_at(loaded.symbols(), 1);
    let metaclass = loaded.class_of(point);
    assert_eq!(loaded.basic_at(metaclass, 5), point);
    assert_eq!(loaded.string_value(loaded.basic_at(point, 1)), "Point");

    let fifth = loaded.basic_at(loaded.basic_at(loaded.symbols(), 7), 2);
    let float = loaded.basic_at(fifth, 2);
    assert_eq!(loaded.float_value(float), 2.5);

    // loaded images collect like any other memory
    assert_eq!(loaded.garbage_collect(), 0);
}

#[test]
fn loading_grows_the_table_to_fit_the_image() {
    let mut memory = ObjectMemory::with_params(MemoryParams {
        initial_size: 64,
        grow_amount: 64,
        max_size: 4096,
    });
    let root = memory.allocate(200);
    memory.set_symbols(root);
    for idx in 1..=200 {
        let object = memory.allocate(1);
        memory.basic_at_put(root, idx, object);
    }
    let mut image = Vec::new();
    memory.write_image(&mut image, &[]).unwrap();

    let mut loaded = ObjectMemory::with_params(MemoryParams {
        initial_size: 16,
        grow_amount: 16,
        max_size: 4096,
    });
    loaded.read_image(&mut Cursor::new(image)).unwrap();

    assert!(loaded.storage_size() >= memory.object_count());
    assert_eq!(loaded.object_count(), memory.object_count());
    assert_eq!(loaded.words(loaded.symbols()), memory.words(memory.symbols()));
}

#[test]
fn truncated_images_are_rejected() {
    let mut memory = ObjectMemory::new();
    populate(&mut memory);
    let mut image = Vec::new();
    memory.write_image(&mut image, &[CORE_TABLE]).unwrap();

    for len in [0, 4, 20, image.len() / 2, image.len() - 1] {
        let mut loaded = ObjectMemory::new();
        let result = loaded.read_image(&mut Cursor::new(&image[..len]));
        assert!(
            matches!(result, Err(ImageError::Truncated { .. })),
            "length {} gave {:?}",
            len,
            result
        );
    }
}

#[test]
fn images_must_start_with_nil() {
    let mut image = Vec::new();
    for word in [0i64, 7, 0] {
        image.extend_from_slice(&word.to_ne_bytes());
    }

    let mut loaded = ObjectMemory::new();
    let result = loaded.read_image(&mut Cursor::new(image));
    assert!(matches!(result, Err(ImageError::Malformed(_))));
}

#[test]
fn malformed_records_are_rejected() {
    let mut image = Vec::new();
    for word in [0i64, 0, 0] {
        image.extend_from_slice(&word.to_ne_bytes());
    }
    image.extend_from_slice(&0u64.to_ne_bytes());
    image.extend_from_slice(&1u64.to_ne_bytes());
    for word in [-3i64, 0, 0] {
        image.extend_from_slice(&word.to_ne_bytes());
    }

    let mut loaded = ObjectMemory::new();
    let result = loaded.read_image(&mut Cursor::new(image));
    assert!(matches!(
        result,
        Err(ImageError::InvalidRecord { handle: -3, .. })
    ));
}
