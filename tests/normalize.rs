use proptest::prelude::*;
use territory_sync::{
    decoder::{COMMA, SEMICOLON, detect_delimiter},
    row::{canonicalize_sub_area_name, is_single_digit, parse_boolean},
};

#[test]
fn canonical_names_for_known_inputs() {
    assert_eq!(canonicalize_sub_area_name("5"), "05");
    assert_eq!(canonicalize_sub_area_name(" 5 "), "05");
    assert_eq!(canonicalize_sub_area_name("05"), "05");
    assert_eq!(canonicalize_sub_area_name("12"), "12");
    assert_eq!(canonicalize_sub_area_name("A"), "A");
    assert_eq!(canonicalize_sub_area_name("５"), "５");
}

proptest! {
    #[test]
    fn canonicalization_is_idempotent(name in "[ ]{0,2}[0-9A-Za-z-]{0,4}[ ]{0,2}") {
        let once = canonicalize_sub_area_name(&name);
        prop_assert_eq!(canonicalize_sub_area_name(&once), once.clone());
        prop_assert!(!is_single_digit(&once));
    }

    #[test]
    fn single_digits_gain_exactly_one_zero(digit in 0u8..10) {
        let name = digit.to_string();
        prop_assert_eq!(canonicalize_sub_area_name(&name), format!("0{digit}"));
    }

    #[test]
    fn truthy_tokens_parse_regardless_of_case_and_padding(
        token in prop::sample::select(vec!["true", "1", "t", "sim", "yes"]),
        upper in any::<bool>(),
        pad in "[ ]{0,3}",
    ) {
        let cased = if upper { token.to_uppercase() } else { token.to_string() };
        let padded = format!("{pad}{cased}{pad}");
        prop_assert!(parse_boolean(&padded));
    }

    #[test]
    fn anything_else_is_false(value in "[a-z0-9]{0,6}") {
        let expected = matches!(value.as_str(), "true" | "1" | "t" | "sim" | "yes");
        prop_assert_eq!(parse_boolean(&value), expected);
    }

    #[test]
    fn delimiter_follows_the_majority(semicolons in 0usize..6, commas in 0usize..6) {
        let line = format!("{}{}", ";".repeat(semicolons), ",".repeat(commas));
        let expected = if commas > semicolons { COMMA } else { SEMICOLON };
        prop_assert_eq!(detect_delimiter(&line), expected);
    }
}
