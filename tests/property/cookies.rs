//! Cookie header parsing.

use proptest::prelude::*;

use spoe_auth::credential::parse_cookies;

use crate::generators::{arb_cookie_name, arb_cookie_value};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every well-formed pair survives arbitrary whitespace and empty segments.
    #[test]
    fn prop_pairs_survive_noise(
        pairs in prop::collection::vec((arb_cookie_name(), arb_cookie_value()), 1..6),
        pad in "[ ]{0,3}",
        extra_semis in 0usize..3,
    ) {
        let separator = format!("{pad};{}{pad}", ";".repeat(extra_semis));
        let header = pairs
            .iter()
            .map(|(n, v)| format!("{pad}{n}{pad}={pad}{v}{pad}"))
            .collect::<Vec<_>>()
            .join(&separator);

        let parsed = parse_cookies(&header);
        for (name, _) in &pairs {
            // last occurrence wins
            let expected = pairs.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v);
            prop_assert_eq!(parsed.get(name), expected);
        }
    }

    /// Segments without `=` never produce entries.
    #[test]
    fn prop_segments_without_separator_ignored(segments in prop::collection::vec("[a-z ]{0,12}", 0..6)) {
        prop_assert!(parse_cookies(&segments.join(";")).is_empty());
    }
}
