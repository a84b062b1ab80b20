//! Symbol normalization.

/// Canonical form of a symbol: trimmed and uppercased.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Normalize a configured symbol list.
///
/// Empty entries are dropped and duplicates removed, keeping the first
/// occurrence so the configured order survives.
pub fn normalize_symbols<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for s in raw {
        let sym = normalize_symbol(s.as_ref());
        if !sym.is_empty() && !out.contains(&sym) {
            out.push(sym);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_and_uppercases() {
        assert_eq!(normalize_symbol("  nflx "), "NFLX");
    }

    #[test]
    fn drops_empty_and_duplicate_entries() {
        let syms = normalize_symbols(["fb", "AMZN", "", " ", "Fb", "goog"]);
        assert_eq!(syms, vec!["FB", "AMZN", "GOOG"]);
    }

    proptest! {
        #[test]
        fn normalized_list_has_no_duplicates_or_lowercase(
            raw in proptest::collection::vec("[a-zA-Z ]{0,6}", 0..20)
        ) {
            let syms = normalize_symbols(&raw);
            for (i, s) in syms.iter().enumerate() {
                prop_assert!(!s.is_empty());
                prop_assert_eq!(s.clone(), s.to_uppercase());
                prop_assert_eq!(s.trim(), s.as_str());
                prop_assert!(!syms[i + 1..].contains(s));
            }
        }

        #[test]
        fn normalization_is_idempotent(raw in proptest::collection::vec("[a-zA-Z]{1,5}", 0..10)) {
            let once = normalize_symbols(&raw);
            let twice = normalize_symbols(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
