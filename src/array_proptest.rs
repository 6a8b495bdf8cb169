//! Property-based tests for the array codec and the key state codecs.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;

    use crate::array::{array_key_name, array_suffix, decode_array_suffix, split_array_name};
    use crate::comment::{CommentCodec, CommentStyle};
    use crate::meta::MetaClassifier;
    use crate::store::Key;
    use proptest::prelude::*;

    // ============================================================================
    // array suffix property tests
    // ============================================================================

    proptest! {
        /// Property: decoding an encoded suffix yields the original index
        #[test]
        fn suffix_decodes_to_index(index in any::<usize>()) {
            prop_assert_eq!(decode_array_suffix(&array_suffix(index)), Some(index));
        }

        /// Property: string order of suffixes equals numeric order of indices
        #[test]
        fn suffix_order_matches_index_order(a in 0usize..1_000_000_000, b in 0usize..1_000_000_000) {
            let (sa, sb) = (array_suffix(a), array_suffix(b));
            prop_assert_eq!(sa.cmp(&sb), a.cmp(&b), "{} vs {}", sa, sb);
        }

        /// Property: the underscore count is always digits - 1
        #[test]
        fn suffix_padding_matches_digit_count(index in any::<u32>()) {
            let suffix = array_suffix(index as usize);
            let underscores = suffix.chars().filter(|c| *c == '_').count();
            prop_assert_eq!(underscores, index.to_string().len() - 1);
        }

        /// Property: non-canonical suffixes (extra underscores) are rejected
        #[test]
        fn extra_padding_is_rejected(index in 0usize..1_000_000, extra in 1usize..4) {
            let suffix = array_suffix(index).replacen('#', &format!("#{}", "_".repeat(extra)), 1);
            prop_assert_eq!(decode_array_suffix(&suffix), None);
        }

        /// Property: element names split back into base and index
        #[test]
        fn element_name_splits(base in "user(/[a-z]{1,8}){1,4}", index in 0usize..100_000) {
            let name = array_key_name(&base, index);
            prop_assert_eq!(split_array_name(&name), Some((base.as_str(), index)));
        }
    }

    // ============================================================================
    // comment codec property tests
    // ============================================================================

    proptest! {
        /// Property: a written comment reads back unchanged, in either style
        #[test]
        fn comment_reads_back(
            lines in prop::collection::vec("[ #A-Za-z0-9][ #A-Za-z0-9.]{0,12}", 1..6),
            legacy in any::<bool>(),
        ) {
            let style = if legacy { CommentStyle::Comments } else { CommentStyle::Comment };
            let codec = CommentCodec::new(style);
            let comment = lines.join("\n");
            let mut key = Key::new("user/test/x");
            codec.write(&mut key, &comment);
            prop_assert_eq!(codec.read(&key), comment);
        }

        /// Property: rewriting a shorter comment leaves no stale lines
        #[test]
        fn shorter_comment_drops_stale_lines(long in 2usize..8, short in 1usize..2) {
            let codec = CommentCodec::default();
            let mut key = Key::new("user/test/x");
            let lines = |n: usize| (0..n).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
            codec.write(&mut key, &lines(long));
            codec.write(&mut key, &lines(short));
            prop_assert_eq!(key.meta_names().len(), short);
        }
    }

    // ============================================================================
    // metadata reconciler property tests
    // ============================================================================

    proptest! {
        /// Property: applying desired metadata twice changes nothing the second time
        #[test]
        fn meta_apply_is_idempotent(
            existing in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,4}", 0..6),
            desired in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,4}", 0..6),
            purge in any::<bool>(),
        ) {
            let classifier = MetaClassifier::new();
            let mut key = Key::new("user/test/x").with_meta("internal/mtime", "1");
            for (name, value) in &existing {
                key.set_meta(name.as_str(), value.as_str());
            }

            classifier.apply(&mut key, &desired, purge);
            prop_assert!(classifier.in_sync(&key, &desired, purge));

            let second = classifier.apply(&mut key, &desired, purge);
            prop_assert!(second.set.is_empty());
            prop_assert!(second.removed.is_empty());
            prop_assert_eq!(key.get_meta("internal/mtime"), Some("1"));
        }

        /// Property: without purging, existing entries are never removed
        #[test]
        fn meta_apply_without_purge_keeps_entries(
            existing in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,4}", 0..6),
            desired in prop::collection::btree_map("[A-Z]{1,6}", "[a-z0-9]{0,4}", 0..6),
        ) {
            let classifier = MetaClassifier::new();
            let mut key = Key::new("user/test/x");
            for (name, value) in &existing {
                key.set_meta(name.as_str(), value.as_str());
            }
            classifier.apply(&mut key, &desired, false);
            let names: BTreeMap<String, String> = key
                .meta()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            for (name, value) in &existing {
                prop_assert_eq!(names.get(name), Some(value));
            }
        }
    }
}
