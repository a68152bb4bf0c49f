//! Property tests for composite layout.
//!
//! For arbitrary field lists: every field offset is aligned to the field's
//! natural alignment, struct fields never overlap, the struct size is a
//! multiple of the struct alignment, and unions place everything at zero
//! with size at least the widest member.

use proptest::prelude::*;

use mcc_ir::ctypes::{Composite, CompositeEnv, CompositeKind, CType, Signedness};

fn scalar_type() -> impl Strategy<Value = CType> {
    prop_oneof![
        Just(CType::char()),
        Just(CType::Int {
            size: mcc_ir::IntSize::I16,
            sign: Signedness::Signed
        }),
        Just(CType::int()),
        Just(CType::Long {
            sign: Signedness::Signed
        }),
        Just(CType::pointer(CType::int())),
        Just(CType::Array {
            elem: Box::new(CType::char()),
            len: Some(3)
        }),
    ]
}

fn env_with(kind: CompositeKind, fields: &[CType]) -> CompositeEnv {
    let mut env = CompositeEnv::new();
    env.define(
        "t",
        Composite {
            kind,
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, ty)| (format!("f{}", i), ty.clone()))
                .collect(),
        },
    );
    env
}

proptest! {
    #[test]
    fn struct_layout_is_sound(fields in proptest::collection::vec(scalar_type(), 1..8)) {
        let env = env_with(CompositeKind::Struct, &fields);
        let layout = env.layout("t").expect("layout");

        prop_assert_eq!(layout.size % layout.align, 0);
        let mut prev_end = 0u64;
        for ((_, offset), ty) in layout.offsets.iter().zip(fields.iter()) {
            let align = ty.alignof(&env).unwrap();
            let size = ty.sizeof(&env).unwrap();
            prop_assert_eq!(offset % align, 0, "offset {} misaligned for {:?}", offset, ty);
            prop_assert!(*offset >= prev_end, "fields overlap");
            prev_end = offset + size;
            prop_assert!(align <= layout.align);
        }
        prop_assert!(layout.size >= prev_end);
    }

    #[test]
    fn union_layout_is_sound(fields in proptest::collection::vec(scalar_type(), 1..8)) {
        let env = env_with(CompositeKind::Union, &fields);
        let layout = env.layout("t").expect("layout");

        prop_assert_eq!(layout.size % layout.align, 0);
        for ((_, offset), ty) in layout.offsets.iter().zip(fields.iter()) {
            prop_assert_eq!(*offset, 0);
            prop_assert!(layout.size >= ty.sizeof(&env).unwrap());
        }
    }
}
