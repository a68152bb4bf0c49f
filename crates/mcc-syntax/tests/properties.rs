//! Property tests for the parser's algebraic laws.
//!
//! - Type-specifier canonicalization is idempotent: re-normalizing a
//!   canonical string is the identity.
//! - Print/parse round-trip: for any expression source the parser accepts,
//!   printing the AST and re-parsing yields a structurally equal AST.

use proptest::prelude::*;

use mcc_syntax::parser::{normalize_specifiers, normalize_type_spec, parse_translation_unit};
use mcc_syntax::printer::print_program;

fn specifier_word() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("void"),
        Just("char"),
        Just("short"),
        Just("int"),
        Just("long"),
        Just("signed"),
        Just("unsigned"),
        Just("float"),
        Just("double"),
    ]
}

/// Random expression source text built from grammar productions, so every
/// generated string is syntactically valid C.
fn expr_source() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("x".to_string()),
        Just("y".to_string()),
        Just("0".to_string()),
        Just("42".to_string()),
        Just("'a'".to_string()),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} + {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} - {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} * {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} < {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} == {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} && {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} || {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} << {}", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{} = {}", a, b)),
            inner.clone().prop_map(|a| format!("({})", a)),
            inner.clone().prop_map(|a| format!("-({})", a)),
            inner.clone().prop_map(|a| format!("!{}", a)),
            inner.clone().prop_map(|a| format!("~{}", a)),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(a, b, c)| format!("{} ? {} : {}", a, b, c)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{}[{}]", a, b)),
            inner.clone().prop_map(|a| format!("f({})", a)),
        ]
    })
}

proptest! {
    #[test]
    fn normalization_is_idempotent(words in proptest::collection::vec(specifier_word(), 1..4)) {
        // Invalid multisets are rejected; valid ones normalize to a fixed
        // point of re-normalization.
        if let Ok(canonical) = normalize_specifiers(&words) {
            prop_assert_eq!(normalize_type_spec(&canonical), canonical.clone());
            prop_assert_eq!(
                normalize_type_spec(&normalize_type_spec(&canonical)),
                canonical
            );
        }
    }

    #[test]
    fn print_parse_roundtrip(src in expr_source()) {
        let unit = format!("int f() {{ return {}; }}", src);
        let first = parse_translation_unit(&unit, "prop.c").expect("accepting parse");
        let printed = print_program(&first);
        let second = parse_translation_unit(&printed, "prop.c")
            .unwrap_or_else(|e| panic!("printed form failed to parse:\n{}\n{}", printed, e));
        prop_assert_eq!(first, second, "printed form:\n{}", printed);
    }
}
