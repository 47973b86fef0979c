//! Path matchers for artifact include/exclude filters.
//!
//! Patterns use the `syntax:pattern` form: `glob:**/*.class` or
//! `regex:.*/generated/.*`. A pattern without a prefix is a glob.
//! Globs are translated to anchored regular expressions:
//! - `*` matches within one path component, `**` crosses components
//! - `?` matches one character other than `/`
//! - `{a,b}` is an alternation, `[abc]` / `[!abc]` a character class

use regex::Regex;
use std::fmt;
use std::path::Path;

use crate::error::{CoverageError, Result};

#[derive(Clone)]
pub struct PathMatcher {
    source: String,
    regex: Regex,
}

impl PathMatcher {
    pub fn parse(pattern: &str) -> Result<Self> {
        let regex_source = if let Some(glob) = pattern.strip_prefix("glob:") {
            glob_to_regex(glob)?
        } else if let Some(re) = pattern.strip_prefix("regex:") {
            format!("^(?:{re})$")
        } else {
            glob_to_regex(pattern)?
        };

        let regex = Regex::new(&regex_source).map_err(|e| {
            CoverageError::Configuration(format!("Invalid path pattern '{pattern}': {e}"))
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn parse_all(patterns: &[String]) -> Result<Vec<Self>> {
        patterns.iter().map(|p| Self::parse(p)).collect()
    }

    /// Matches against the path rendered with `/` separators.
    pub fn matches(&self, path: &Path) -> bool {
        let rendered = path.to_string_lossy();
        if std::path::MAIN_SEPARATOR == '/' {
            self.regex.is_match(&rendered)
        } else {
            self.regex
                .is_match(&rendered.replace(std::path::MAIN_SEPARATOR, "/"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathMatcher").field(&self.source).finish()
    }
}

impl fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn glob_to_regex(glob: &str) -> Result<String> {
    let invalid = |reason: &str| {
        CoverageError::Configuration(format!("Invalid glob pattern '{glob}': {reason}"))
    };

    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push('^');

    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    let mut in_group = false;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    out.push_str(".*");
                    i += 1;
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '{' => {
                if in_group {
                    return Err(invalid("nested groups are not supported"));
                }
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| invalid("unclosed character class"))?;
                out.push('[');
                let mut body = &chars[i + 1..close];
                if let Some('!') = body.first() {
                    out.push('^');
                    body = &body[1..];
                }
                for &ch in body {
                    if ch == '\\' || ch == '[' || ch == '^' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push(']');
                i = close;
            }
            '\\' => {
                let next = chars
                    .get(i + 1)
                    .ok_or_else(|| invalid("dangling escape"))?;
                out.push_str(&regex::escape(&next.to_string()));
                i += 1;
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    if in_group {
        return Err(invalid("unclosed group"));
    }

    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, path: &str) -> bool {
        PathMatcher::parse(pattern).unwrap().matches(Path::new(path))
    }

    #[test]
    fn test_double_star_crosses_directories() {
        assert!(m("glob:**.class", "/app/classes/com/acme/Foo.class"));
        assert!(m("glob:**.jar", "/app/lib/x.jar"));
        assert!(!m("glob:**.class", "/app/classes/com/acme/Foo.java"));
    }

    #[test]
    fn test_single_star_stays_in_component() {
        assert!(m("glob:/app/*.class", "/app/Foo.class"));
        assert!(!m("glob:/app/*.class", "/app/com/Foo.class"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        assert!(m("glob:/a/?.txt", "/a/x.txt"));
        assert!(!m("glob:/a/?.txt", "/a/xy.txt"));
        assert!(m("glob:/a/[abc].txt", "/a/b.txt"));
        assert!(!m("glob:/a/[!abc].txt", "/a/b.txt"));
        assert!(m("glob:/a/[!abc].txt", "/a/d.txt"));
    }

    #[test]
    fn test_alternation() {
        assert!(m("glob:**.{class,jar}", "/x/y.jar"));
        assert!(m("glob:**.{class,jar}", "/x/y.class"));
        assert!(!m("glob:**.{class,jar}", "/x/y.war"));
    }

    #[test]
    fn test_regex_syntax() {
        assert!(m("regex:.*/generated/.*", "/app/classes/generated/A.class"));
        assert!(!m("regex:.*/generated/.*", "/app/classes/A.class"));
    }

    #[test]
    fn test_bare_pattern_is_glob() {
        assert!(m("**/Test*.class", "/app/com/TestFoo.class"));
    }

    #[test]
    fn test_dots_are_literal() {
        assert!(!m("glob:**.class", "/app/Fooxclass"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathMatcher::parse("glob:{a,b").is_err());
        assert!(PathMatcher::parse("glob:[abc").is_err());
        assert!(PathMatcher::parse("regex:(unclosed").is_err());
        let err = PathMatcher::parse("regex:(").unwrap_err();
        assert!(err.is_configuration());
    }
}
