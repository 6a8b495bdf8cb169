//! Array element naming.
//!
//! Ordered lists are stored as one key per element, named
//! `<base>/#<padded-index>`. The index is prefixed by one underscore for every
//! digit beyond the first, so a plain string comparison of element names
//! sorts them in numeric order:
//!
//! | index  | suffix         |
//! |--------|----------------|
//! | 0      | `#0`           |
//! | 9      | `#9`           |
//! | 10     | `#_10`         |
//! | 100    | `#__100`       |
//! | 100000 | `#_____100000` |
//!
//! The same suffix format is used for comment and validation-rule metadata
//! arrays, and for the element counters that accompany them.

/// Encode an index as an array suffix (`#`, padding underscores, digits).
///
/// # Examples
///
/// ```
/// use kdb_state::array::array_suffix;
///
/// assert_eq!(array_suffix(9), "#9");
/// assert_eq!(array_suffix(10), "#_10");
/// ```
pub fn array_suffix(index: usize) -> String {
    let digits = index.to_string();
    format!("#{}{}", "_".repeat(digits.len() - 1), digits)
}

/// Name of the array element `index` below `base`.
pub fn array_key_name(base: &str, index: usize) -> String {
    format!("{}/{}", base.trim_end_matches('/'), array_suffix(index))
}

/// Decode an array suffix back into its index.
///
/// Returns `None` for anything that is not a canonical array suffix: a
/// missing `#`, non-digit characters, leading zeros, or an underscore count
/// that does not equal `digits - 1`. Such names are treated as ordinary keys.
pub fn decode_array_suffix(suffix: &str) -> Option<usize> {
    let rest = suffix.strip_prefix('#')?;
    let digits = rest.trim_start_matches('_');
    let underscores = rest.len() - digits.len();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if underscores != digits.len() - 1 {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Split an array element name into its base name and index.
///
/// ```
/// use kdb_state::array::split_array_name;
///
/// assert_eq!(split_array_name("user/list/#_12"), Some(("user/list", 12)));
/// assert_eq!(split_array_name("user/list/item"), None);
/// ```
pub fn split_array_name(name: &str) -> Option<(&str, usize)> {
    let (base, last) = name.rsplit_once('/')?;
    decode_array_suffix(last).map(|index| (base, index))
}

/// Check that a set of element indices is exactly `0..indices.len()`.
pub fn is_contiguous(indices: &[usize]) -> bool {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(expected, &index)| expected == index)
}
