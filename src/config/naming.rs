//! Property and member name variants.
//!
//! A logical name like `cache.maxDelay` may be spelled `cache.max_delay` or
//! `cache.max-delay` by a given source. Conversions apply to each
//! dot-separated segment so the namespace structure is preserved.

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase};

/// Returns `name` followed by its snake, kebab and lowerCamel spellings,
/// without duplicates.
pub fn variants(name: &str) -> Vec<String> {
    let mut variants = vec![name.to_string()];
    let conversions: [fn(&str) -> String; 3] = [
        |s: &str| s.to_snake_case(),
        |s: &str| s.to_kebab_case(),
        |s: &str| s.to_lower_camel_case(),
    ];

    for convert in conversions {
        let variant = map_segments(name, convert);
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants
}

fn map_segments(name: &str, convert: fn(&str) -> String) -> String {
    name.split('.')
        .map(|segment| {
            // heck drops leading/trailing separators, keep empty segments intact
            if segment.is_empty() {
                String::new()
            } else {
                convert(segment)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// True if two member names refer to the same member under the
/// `block-size` / `block_size` / `blockSize` convention.
pub fn same_member(a: &str, b: &str) -> bool {
    a == b || a.to_snake_case() == b.to_snake_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_name_variants() {
        assert_eq!(
            variants("cache.maxDelay"),
            vec!["cache.maxDelay", "cache.max_delay", "cache.max-delay"]
        );
    }

    #[test]
    fn test_snake_name_variants() {
        assert_eq!(
            variants("max_delay"),
            vec!["max_delay", "max-delay", "maxDelay"]
        );
    }

    #[test]
    fn test_plain_name_has_single_variant() {
        assert_eq!(variants("a.b.c"), vec!["a.b.c"]);
    }

    #[test]
    fn test_same_member() {
        assert!(same_member("block-size", "block_size"));
        assert!(same_member("blockSize", "block_size"));
        assert!(!same_member("block", "block_size"));
    }
}
