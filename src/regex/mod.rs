//! A small backtracking regex engine over byte strings.
//!
//! The supported grammar is an ASCII-oriented ECMAScript subset: literals,
//! classes, alternation, greedy and lazy quantifiers, capture groups,
//! backreferences, anchors, word boundaries and lookahead. Patterns compile
//! once into a flat program; matching allocates only the capture array plus
//! one snapshot per pending backtrack point.
//!
//! Backtracking runs on the native call stack, so pathological patterns
//! (`(a*)*b` against a long run of `a`s) take exponential time and can
//! exhaust the stack. Callers feeding untrusted patterns must bound them.

mod exec;
mod flatten;
mod parse;

use exec::Group;
use flatten::Program;
pub use parse::PatternError;

/// A compiled pattern. Immutable; matching takes `&self`.
#[derive(Debug, Clone)]
pub struct Regex {
    program: Program,
    n_groups: usize,
}

impl Regex {
    /// Compiles a pattern. Bytes outside ASCII are matched individually, so
    /// multi-byte UTF-8 works as long as the pattern spells the same bytes
    /// (write `\xHH` escapes for bytes a `&str` cannot hold raw).
    pub fn new(pattern: &str) -> Result<Regex, PatternError> {
        let (node, n_groups) = parse::parse(pattern.as_bytes())?;
        Ok(Regex {
            program: flatten::flatten(&node),
            n_groups,
        })
    }

    /// Number of groups, counting the whole match as group 0.
    pub fn group_count(&self) -> usize {
        self.n_groups
    }

    /// Matches anchored at `at`. Anchors and word boundaries still see the
    /// whole of `text`, so `^` only holds when `at` is 0.
    pub fn match_at<'t>(&self, text: &'t [u8], at: usize) -> Option<Match<'t>> {
        assert!(at <= text.len());
        let mut groups = vec![(None, None); self.n_groups];
        let end = exec::run(text, &self.program, at, &mut groups)?;
        groups[0] = (Some(at), Some(end));
        Some(Match { text, groups })
    }

    /// First match at the lowest possible start position.
    pub fn search<'t>(&self, text: &'t [u8]) -> Option<Match<'t>> {
        (0..text.len()).find_map(|at| self.match_at(text, at))
    }

    /// Replaces every match, leftmost and non-overlapping. `\0` through `\9`
    /// in the template expand to the captured bytes (unset groups to
    /// nothing); any other escaped byte is emitted as itself. An empty match
    /// keeps the byte under it and moves on one position.
    pub fn replace(&self, text: &[u8], template: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len());
        let mut pos = 0;
        while pos < text.len() {
            let found = match self.match_at(text, pos) {
                Some(found) => found,
                None => {
                    out.push(text[pos]);
                    pos += 1;
                    continue;
                }
            };
            let mut template = template.iter();
            while let Some(&b) = template.next() {
                if b != b'\\' {
                    out.push(b);
                    continue;
                }
                match template.next().copied() {
                    Some(d @ b'0'..=b'9') => {
                        if let Some(group) = found.group(usize::from(d - b'0')) {
                            out.extend_from_slice(group);
                        }
                    }
                    Some(other) => out.push(other),
                    None => out.push(b'\\'),
                }
            }
            if found.end() > pos {
                pos = found.end();
            } else {
                out.push(text[pos]);
                pos += 1;
            }
        }
        out
    }
}

/// A successful match, borrowing the searched text.
#[derive(Debug, Clone)]
pub struct Match<'t> {
    text: &'t [u8],
    groups: Vec<Group>,
}

impl<'t> Match<'t> {
    /// The bytes of group `n`, or None if the group did not participate.
    /// Group 0 is the whole match and always participates.
    pub fn group(&self, n: usize) -> Option<&'t [u8]> {
        let (start, end) = self.range(n)?;
        Some(&self.text[start..end])
    }

    /// Byte offsets of group `n` within the searched text.
    pub fn range(&self, n: usize) -> Option<(usize, usize)> {
        match self.groups.get(n) {
            Some(&(Some(start), Some(end))) => Some((start, end)),
            _ => None,
        }
    }

    pub fn start(&self) -> usize {
        self.groups[0].0.unwrap()
    }

    pub fn end(&self) -> usize {
        self.groups[0].1.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Matches at position 0 and compares every group, None for groups that
    /// did not participate. `expect` None means the whole match must fail.
    fn check(pattern: &str, input: &str, expect: Option<&[Option<&str>]>) {
        let regex = Regex::new(pattern).unwrap();
        let found = regex.match_at(input.as_bytes(), 0);
        match (&found, expect) {
            (None, None) => {}
            (Some(found), Some(groups)) => {
                assert_eq!(regex.group_count(), groups.len(), "{pattern:?} group count");
                for (n, want) in groups.iter().enumerate() {
                    let got = found.group(n).map(|g| std::str::from_utf8(g).unwrap());
                    assert_eq!(got, *want, "{pattern:?} on {input:?}, group {n}");
                }
            }
            _ => panic!(
                "{pattern:?} on {input:?}: matched = {}, expected {}",
                found.is_some(),
                expect.is_some()
            ),
        }
    }

    #[test]
    fn literals_and_classes() {
        check("abc", "abc", Some(&[Some("abc")]));
        check("abc", "abcd", Some(&[Some("abc")]));
        check("(ab)c", "abc", Some(&[Some("abc"), Some("ab")]));
        check("abc", "def", None);
        check("[Aa]", "A", Some(&[Some("A")]));
        check("[Aa][Bb][Cc]", "Abc", Some(&[Some("Abc")]));
        check("[Aa][Bb][Cc]", "bcd", None);
        // Multi-byte UTF-8 is matched bytewise.
        check("\\xC3[\\xB8\\x98]", "ø", Some(&[Some("ø")]));
    }

    #[test]
    fn alternation_order() {
        check("(abc|def)", "abcx", Some(&[Some("abc"), Some("abc")]));
        check("(abc|def)", "defx", Some(&[Some("def"), Some("def")]));
        check("(abc|def)", "ghix", None);
        // The first alternative wins even when the second is longer, and
        // backtracking into the choice still works.
        check("(abc|abcd)de", "abcde", Some(&[Some("abcde"), Some("abc")]));
        check("(abc|abcd)de", "abcdde", Some(&[Some("abcdde"), Some("abcd")]));
        check("(abcd|abc)de", "abcde", Some(&[Some("abcde"), Some("abc")]));
        check("(abcd|abc)de", "abcdde", Some(&[Some("abcdde"), Some("abcd")]));
        for (input, g1, g2) in [
            ("abcghix", "abc", "ghi"),
            ("abcjklx", "abc", "jkl"),
            ("defghix", "def", "ghi"),
            ("defjklx", "def", "jkl"),
        ] {
            check(
                "(abc|def)(ghi|jkl)",
                input,
                Some(&[Some(&input[..6]), Some(g1), Some(g2)]),
            );
        }
        check("(abc|def)(ghi|jkl)", "abcdef", None);
        check("(abc|def)(ghi|jkl)", "abcgkl", None);
    }

    #[test]
    fn repeats() {
        check("(a){5}", "aaaaaa", Some(&[Some("aaaaa"), Some("a")]));
        check("([ab])*", "ab", Some(&[Some("ab"), Some("b")]));
        check("([ab])*", "a", Some(&[Some("a"), Some("a")]));
        check("([ab])*", "", Some(&[Some(""), None]));
        check("([ab])+?c", "abc", Some(&[Some("abc"), Some("b")]));
        check("((.)..)+", "12345678", Some(&[Some("123456"), Some("456"), Some("4")]));
        check("((.)..)+...", "12345678", Some(&[Some("123456"), Some("123"), Some("1")]));
        check("((.)..){1,5}", "12345678", Some(&[Some("123456"), Some("456"), Some("4")]));
        check("((.)..){1,5}...", "12345678", Some(&[Some("123456"), Some("123"), Some("1")]));
    }

    #[test]
    fn backreferences() {
        check("(abc)?\\1", "", Some(&[Some(""), None]));
        // Taking the group means \1 needs a second "abc"; skipping it
        // matches empty with the group unset.
        check("(abc)?\\1", "abc", Some(&[Some(""), None]));
        check("(abc)?\\1", "abcabc", Some(&[Some("abcabc"), Some("abc")]));
        check("((.)\\2){3}", "aabbccddeeff", Some(&[Some("aabbcc"), Some("cc"), Some("c")]));
        check("((.)\\2){2,4}", "aabbcc", Some(&[Some("aabbcc"), Some("cc"), Some("c")]));
        check("((.)\\2){2,4}?", "aabbcc", Some(&[Some("aabb"), Some("bb"), Some("b")]));
    }

    #[test]
    fn capture_cleanup_across_iterations() {
        // Only the last iteration's branch may leave its group set.
        check("((a)|(b))+", "ab", Some(&[Some("ab"), Some("b"), None, Some("b")]));
        check("((a)|(b))+", "ba", Some(&[Some("ba"), Some("a"), Some("a"), None]));
        check("((a)|(b)){2}", "ab", Some(&[Some("ab"), Some("b"), None, Some("b")]));
        check("((a)|(b)){2}", "ba", Some(&[Some("ba"), Some("a"), Some("a"), None]));
        check("((a)\\2|(b)\\3){2}", "aabb", Some(&[Some("aabb"), Some("bb"), None, Some("b")]));
        check("((a)\\2|(b)\\3){2}", "bbaa", Some(&[Some("bbaa"), Some("aa"), Some("a"), None]));
    }

    #[test]
    fn lookahead() {
        // Captures made inside a positive lookahead stay visible.
        check("((?=(.b)))a", "ab", Some(&[Some("a"), Some(""), Some("ab")]));
        check("((?!(.b)))a", "ab", None);
        check("((?=(.b)))a", "ac", None);
        check("((?!(.b)))a", "ac", Some(&[Some("a"), Some(""), None]));
        check("(?!(.)\\1)a", "ab", Some(&[Some("a"), None]));
        check("(?!(.)\\1)a", "aa", None);
    }

    #[test]
    fn word_boundaries() {
        check("\\b.\\b.\\B", "a+", Some(&[Some("a+")]));
        check("\\B.\\b.\\b", "+a", Some(&[Some("+a")]));
        check(".\\b.", "++", None);
        check(".\\b.", "aa", None);
        check("\\b.", "+", None);
        check("\\B.", "a", None);
        check(".\\b", "+", None);
        check(".\\B", "a", None);
    }

    #[test]
    fn search_scans_forward() {
        let regex = Regex::new("bc").unwrap();
        let found = regex.search(b"abc").unwrap();
        assert_eq!(found.start(), 1);
        assert_eq!(found.group(0), Some(&b"bc"[..]));
        assert_eq!(found.range(0), Some((1, 3)));
        assert!(regex.search(b"ab").is_none());
        // Search never tries the empty tail; matching there still works.
        let empty = Regex::new("a?").unwrap();
        assert!(empty.search(b"").is_none());
        assert!(empty.match_at(b"", 0).is_some());
    }

    #[test]
    fn anchored_search() {
        let regex = Regex::new("^b").unwrap();
        assert!(regex.search(b"abc").is_none());
        let regex = Regex::new("c$").unwrap();
        assert_eq!(regex.search(b"abc").unwrap().start(), 2);
    }

    #[test]
    fn replace() {
        let regex = Regex::new("f(oo)").unwrap();
        assert_eq!(regex.replace(b"foofoobarfoo", b"\\1"), b"oooobaroo");
        // Unset groups expand to nothing, unknown escapes to themselves.
        let regex = Regex::new("a(x)?b").unwrap();
        assert_eq!(regex.replace(b"ab.", b"[\\1\\-]"), b"[-].");
        // An empty match keeps the underlying byte and must not loop.
        let regex = Regex::new("x*").unwrap();
        assert_eq!(regex.replace(b"abc", b"-"), b"-a-b-c");
    }

    #[test]
    fn search_is_leftmost_match_at() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let regexes = [
            Regex::new("ab+a").unwrap(),
            Regex::new("a(b|c)\\1").unwrap(),
            Regex::new("b.?c").unwrap(),
        ];
        for _ in 0..200 {
            let text: Vec<u8> = (0..rng.gen_range(0..40))
                .map(|_| rng.gen_range(b'a'..=b'c'))
                .collect();
            for regex in &regexes {
                let scanned = (0..text.len())
                    .find_map(|at| regex.match_at(&text, at))
                    .map(|found| (found.start(), found.end()));
                let searched = regex.search(&text).map(|found| (found.start(), found.end()));
                assert_eq!(searched, scanned, "{text:?}");
            }
        }
    }

    #[test]
    fn group_bookkeeping() {
        let regex = Regex::new("(a)(b)?(?:c)").unwrap();
        assert_eq!(regex.group_count(), 3);
        let found = regex.match_at(b"ac", 0).unwrap();
        assert_eq!(found.group(1), Some(&b"a"[..]));
        assert_eq!(found.group(2), None);
        assert_eq!(found.range(2), None);
        assert_eq!(found.end(), 2);
    }
}
