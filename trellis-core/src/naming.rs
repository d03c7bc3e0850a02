//! Naming helpers
//!
//! Method names in a host's table compare without regard to ASCII case,
//! the same way service names and exclusion entries do.

/// Upper-cases the first character (`foo` -> `Foo`)
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-cases the first character (`Foo` -> `foo`)
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Converts an underscore name to camel case (`foo_bar` -> `fooBar`)
pub fn underscore_to_camel(s: &str) -> String {
    let joined: String = s.split('_').map(upper_first).collect();
    lower_first(&joined)
}

/// ASCII case-insensitive equality
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Returns the remainder of `name` after `prefix`, matched case-insensitively at position 0
pub fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&name[prefix.len()..])
    } else {
        None
    }
}

/// Checks whether `needle` is in `haystack`, ignoring case
pub fn contains_ignore_case<S: AsRef<str>>(haystack: &[S], needle: &str) -> bool {
    haystack.iter().any(|item| eq_ignore_case(item.as_ref(), needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_character_case() {
        assert_eq!(upper_first("foo"), "Foo");
        assert_eq!(upper_first("Foo"), "Foo");
        assert_eq!(upper_first(""), "");
        assert_eq!(lower_first("FooBar"), "fooBar");
        assert_eq!(lower_first(""), "");
    }

    #[test]
    fn test_underscore_to_camel() {
        assert_eq!(underscore_to_camel("foo_bar"), "fooBar");
        assert_eq!(underscore_to_camel("foo"), "foo");
        assert_eq!(underscore_to_camel("web_socket_gate"), "webSocketGate");
    }

    #[test]
    fn test_strip_prefix_ignore_case() {
        assert_eq!(strip_prefix_ignore_case("serviceFoo", "service"), Some("Foo"));
        assert_eq!(strip_prefix_ignore_case("SERVICEfoo", "service"), Some("foo"));
        assert_eq!(strip_prefix_ignore_case("service", "service"), Some(""));
        assert_eq!(strip_prefix_ignore_case("onService", "service"), None);
        assert_eq!(strip_prefix_ignore_case("serv", "service"), None);
    }

    #[test]
    fn test_contains_ignore_case() {
        let haystack = vec!["Foo".to_string(), "bar".to_string()];
        assert!(contains_ignore_case(&haystack, "foo"));
        assert!(contains_ignore_case(&haystack, "BAR"));
        assert!(!contains_ignore_case(&haystack, "baz"));
    }
}
