// src/core/glob.rs

//! Glob-to-regex compilation shared by ACL patterns, object-id patterns, and
//! pub/sub subscriptions. A glob pattern only knows one metacharacter: `*`
//! matches any substring; everything else is literal.

use regex::Regex;

/// Compiles a glob pattern (`*` = wildcard, everything else literal) into an
/// anchored regex.
pub fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for part in pattern.split('*') {
        out.push_str(&regex::escape(part));
        out.push_str(".*");
    }
    // Remove the trailing ".*" added by the final split segment, then anchor.
    out.truncate(out.len() - 2);
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").unwrap())
}
