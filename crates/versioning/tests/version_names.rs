//! Property coverage for the versioned-name grammar: every name the
//! versioner would generate must satisfy its own inverse predicate.

use proptest::prelude::*;

use versioning::is_matching_version;

fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos..],
        None => "",
    }
}

proptest! {
    #[test]
    fn generated_names_always_match(
        name in "[A-Za-z0-9_-]{1,16}(\\.[a-z]{1,4})?",
        year in 1970u32..10000,
        month in 1u32..13,
        day in 1u32..29,
        hms in 0u32..240000,
    ) {
        let versioned = format!(
            "{name} {year:04}-{month:02}-{day:02} {hms:06}{}",
            extension(&name)
        );
        prop_assert!(is_matching_version(&name, &versioned, true));
    }

    #[test]
    fn unrelated_names_never_match(
        name in "[A-Za-z0-9_-]{1,16}",
        other in "[A-Za-z0-9_-]{1,16}",
    ) {
        prop_assume!(name != other);
        let versioned = format!("{other} 2024-03-05 143059");
        // a different stem must not be grouped with this file — unless the
        // stem is a prefix whose remainder happens to parse as part of the
        // timestamp, which a single space before four digits rules out here
        if !other.starts_with(&name) {
            prop_assert!(!is_matching_version(&name, &versioned, true));
        }
    }

    #[test]
    fn truncated_timestamps_never_match(
        name in "[A-Za-z0-9_-]{1,16}",
        cut in 1usize..18,
    ) {
        let full = format!("{name} 2024-03-05 143059");
        let truncated = &full[..full.len() - cut];
        prop_assert!(!is_matching_version(&name, truncated, true));
    }
}
