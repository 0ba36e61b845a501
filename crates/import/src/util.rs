/// Declares a function returning a lazily compiled, process-wide `Regex`.
macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static regex::Regex {
            static R: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub(crate) use re;

/// Collapses runs of whitespace to single spaces and trims the ends.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when every character is an ASCII digit (and there is at least one).
pub(crate) fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_trims_and_joins() {
        assert_eq!(collapse_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn numeric_detection() {
        assert!(is_numeric("5985142"));
        assert!(!is_numeric("#4521"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("12a"));
    }

    re!(re_test_digits, r"^\d+$");

    #[test]
    fn re_macro_compiles_once() {
        assert!(re_test_digits().is_match("123"));
        assert!(std::ptr::eq(re_test_digits(), re_test_digits()));
    }
}
