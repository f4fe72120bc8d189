//! Glob-style topic matching.
//!
//! `*` matches any run of characters (including none) and `?` exactly one.
//! Every other character matches itself; there is no escaping.

/// Returns `true` when `candidate` satisfies `pattern`.
///
/// Evaluates the recursive definition
///
/// ```text
/// match(p, s) = s.is_empty()                                   if p is empty
///             = !s.is_empty() && match(p[1..], s[1..])         if p[0] == '?' or p[0] == s[0]
///             = match(p[1..], s) || (!s.is_empty() && match(p, s[1..]))   if p[0] == '*'
///             = false                                          otherwise
/// ```
///
/// bottom-up, one row per pattern position, so the cost is
/// `O(pattern × candidate)` rather than exponential.
pub fn is_match(candidate: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let s: Vec<char> = candidate.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    // next[j] holds match(p[i + 1..], s[j..]) while row i is computed.
    let mut next: Vec<bool> = (0..=s.len()).map(|j| j == s.len()).collect();
    let mut row = vec![false; s.len() + 1];

    for &pc in p.iter().rev() {
        for j in (0..=s.len()).rev() {
            row[j] = if pc == '?' || (j < s.len() && pc == s[j]) {
                j < s.len() && next[j + 1]
            } else if pc == '*' {
                next[j] || (j < s.len() && row[j + 1])
            } else {
                false
            };
        }
        std::mem::swap(&mut next, &mut row);
    }

    next[0]
}

#[cfg(test)]
mod tests {
    use super::is_match;

    #[test]
    fn star_matches_everything() {
        assert!(is_match("", "*"));
        assert!(is_match("anything/at/all", "*"));
    }

    #[test]
    fn literal_matches_itself() {
        for s in ["", "a", "a/test/channel/123", "ümlaut|ok"] {
            assert!(is_match(s, s), "{s} should match itself");
        }
    }

    #[test]
    fn question_mark_needs_one_char() {
        assert!(!is_match("", "?"));
        assert!(is_match("x", "?"));
        assert!(!is_match("xy", "?"));
        assert!(is_match("é", "?"));
    }

    #[test]
    fn star_spans_segments() {
        assert!(is_match("begin/one/end", "begin/*/end"));
        assert!(is_match("begin/one/two/end", "begin/*/end"));
        assert!(!is_match("begin/one", "begin/*/end"));
        assert!(is_match("begin//end", "begin/*/end"));
    }

    #[test]
    fn trailing_candidate_fails() {
        assert!(!is_match("abc", "ab"));
        assert!(!is_match("", "a"));
        assert!(is_match("abc", "ab*"));
    }

    #[test]
    fn backtracking_across_multiple_stars() {
        assert!(is_match("aXbXc", "a*b*c"));
        assert!(is_match("abcbcd", "a*bcd"));
        assert!(!is_match("abcbce", "a*bcd"));
        assert!(is_match("mississippi", "m*iss*?pi"));
        assert!(is_match("", "**"));
    }

    #[test]
    fn long_inputs_do_not_explode() {
        let candidate = "a".repeat(200);
        let pattern = format!("{}b", "*a".repeat(30));
        assert!(!is_match(&candidate, &pattern));
    }
}
