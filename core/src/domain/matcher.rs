//! Case-insensitive glob matching of process names.

use regex::{Regex, RegexBuilder};

/// Check whether a process name matches a target pattern.
///
/// - An empty pattern matches nothing.
/// - `*` on its own matches every name.
/// - Otherwise the pattern is a case-insensitive glob: `*` matches any run of
///   characters except `/`, `?` matches a single such character and `[...]`
///   (or `[!...]`) is a character class.
pub fn matches(process_name: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern == "*" || process_name == pattern {
        return true;
    }
    match compile_glob(pattern) {
        Some(re) => re.is_match(process_name),
        None => false,
    }
}

/// Translate a glob pattern into an anchored, case-insensitive regex.
///
/// Returns `None` if the translated expression does not compile
/// (for example an unterminated character class).
pub fn compile_glob(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 2);
    expr.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                // `**` behaves like `*` for names without separators
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                expr.push_str("[^/]*");
            }
            '?' => expr.push_str("[^/]"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    class.push('^');
                }
                while let Some(inner) = chars.next() {
                    match inner {
                        ']' if !class.is_empty() && class != "^" => {
                            closed = true;
                            break;
                        }
                        '\\' | '[' | '&' | '~' => {
                            class.push('\\');
                            class.push(inner);
                        }
                        _ => class.push(inner),
                    }
                }
                if !closed {
                    return None;
                }
                expr.push('[');
                expr.push_str(&class);
                expr.push(']');
            }
            _ => expr.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr).case_insensitive(true).build().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_anything() {
        assert!(matches("worker-3", "*"));
        assert!(matches("PRIMARY-app/server-1", "*"));
        assert!(matches("", "*"));
    }

    #[test]
    fn test_exact_pattern_is_case_insensitive() {
        assert!(matches("worker-3", "worker-3"));
        assert!(matches("Worker-3", "WORKER-3"));
        assert!(!matches("worker-30", "worker-3"));
        assert!(!matches("worker-2", "worker-3"));
    }

    #[test]
    fn test_embedded_star() {
        assert!(matches("worker-3", "worker-*"));
        assert!(matches("WORKER-app-1234", "worker-*-1234"));
        assert!(matches("worker-", "worker-*"));
        assert!(!matches("primary-3", "worker-*"));
        assert!(!matches("my-worker-3", "worker-*"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        assert!(matches("worker-3", "worker-?"));
        assert!(!matches("worker-33", "worker-?"));
        assert!(matches("worker-3", "worker-[0-4]"));
        assert!(!matches("worker-7", "worker-[0-4]"));
        assert!(matches("worker-7", "worker-[!0-4]"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("app.js", "app.js"));
        assert!(!matches("appxjs", "app.js"));
        assert!(matches("a+b(1)", "A+B(*)"));
    }

    #[test]
    fn test_empty_and_invalid_patterns() {
        assert!(!matches("worker-3", ""));
        assert!(!matches("worker-3", "worker-[3"));
    }
}
