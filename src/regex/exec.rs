//! Backtracking execution of a flattened program.
//!
//! The native call stack is the backtracking stack: `Backup` snapshots the
//! captures and recurses over the rest of its bridge, restoring and hopping
//! to the retry bridge if that fails. Jumps are taken iteratively so plain
//! sequential programs run in constant stack.

use super::flatten::{Exit, Program, Stone};

/// One group's endpoints. Both unset means the group never matched; start
/// without end happens mid-flight (a backreference into its own group) and
/// is treated as empty.
pub(crate) type Group = (Option<usize>, Option<usize>);

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The bytes a backreference has to re-match right now.
fn group_bytes<'t>(text: &'t [u8], group: Group) -> &'t [u8] {
    match group {
        (Some(start), Some(end)) if start <= end => &text[start..end],
        _ => b"",
    }
}

/// Runs the program against `text` starting at byte `pos`, with the whole
/// slice as the match region (anchors and word boundaries test its edges).
/// Returns the end position of the match. Captures are written through even
/// on failure; the caller owns cleanup.
pub(crate) fn run(text: &[u8], program: &Program, pos: usize, caps: &mut [Group]) -> Option<usize> {
    run_from(text, program, 0, 0, pos, caps)
}

fn run_from(
    text: &[u8],
    program: &Program,
    mut bridge: usize,
    mut first_stone: usize,
    mut pos: usize,
    caps: &mut [Group],
) -> Option<usize> {
    'bridges: loop {
        let stones = &program.bridges[bridge].stones;
        let skip = std::mem::take(&mut first_stone);
        for (idx, stone) in stones.iter().enumerate().skip(skip) {
            match stone {
                Stone::Literal(bytes) => {
                    if !text[pos..].starts_with(bytes) {
                        return None;
                    }
                    pos += bytes.len();
                }
                Stone::Class(ranges) => {
                    let b = match text.get(pos) {
                        Some(&b) => u16::from(b),
                        None => return None,
                    };
                    if !ranges.iter().any(|&(lo, hi)| lo <= b && b < hi) {
                        return None;
                    }
                    pos += 1;
                }
                Stone::CaptureStart(n) => caps[*n].0 = Some(pos),
                Stone::CaptureEnd(n) => caps[*n].1 = Some(pos),
                Stone::CaptureDelete(groups) => {
                    for &n in groups {
                        caps[n] = (None, None);
                    }
                }
                Stone::Backreference(n) => {
                    let needle = group_bytes(text, caps[*n]);
                    if !text[pos..].starts_with(needle) {
                        return None;
                    }
                    pos += needle.len();
                }
                Stone::Anchor { end: false } => {
                    if pos != 0 {
                        return None;
                    }
                }
                Stone::Anchor { end: true } => {
                    if pos != text.len() {
                        return None;
                    }
                }
                Stone::WordBoundary { expect } => {
                    // '.' is a stand-in non-word byte beyond either edge.
                    let before = if pos == 0 { b'.' } else { text[pos - 1] };
                    let after = *text.get(pos).unwrap_or(&b'.');
                    if (is_word_byte(before) != is_word_byte(after)) != *expect {
                        return None;
                    }
                }
                Stone::Lookahead {
                    positive,
                    program: inner,
                } => {
                    let matched = run(text, inner, pos, caps).is_some();
                    if matched != *positive {
                        return None;
                    }
                }
                Stone::Backup(retry) => {
                    let snapshot = caps.to_vec();
                    if let Some(end) = run_from(text, program, bridge, idx + 1, pos, caps) {
                        return Some(end);
                    }
                    caps.copy_from_slice(&snapshot);
                    bridge = *retry;
                    continue 'bridges;
                }
            }
        }
        match program.bridges[bridge].exit {
            Exit::Accept => return Some(pos),
            Exit::Jump(target) => bridge = target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::flatten::flatten;
    use crate::regex::parse::parse;

    fn run_pattern(pattern: &str, text: &[u8], at: usize) -> Option<(usize, Vec<Group>)> {
        let (node, n_groups) = parse(pattern.as_bytes()).unwrap();
        let program = flatten(&node);
        let mut caps = vec![(None, None); n_groups];
        run(text, &program, at, &mut caps).map(|end| (end, caps))
    }

    #[test]
    fn backtracking_restores_captures() {
        // The first alternative captures, fails at 'd', and must leave no
        // trace once the second wins.
        let (end, caps) = run_pattern("(ab)d|abx", b"abx", 0).unwrap();
        assert_eq!(end, 3);
        assert_eq!(caps[1], (None, None));
    }

    #[test]
    fn anchors_use_region_edges() {
        assert!(run_pattern("^a", b"ab", 0).is_some());
        assert!(run_pattern("^b", b"ab", 1).is_none());
        assert!(run_pattern("b$", b"ab", 1).is_some());
        assert!(run_pattern("a$", b"ab", 0).is_none());
    }

    #[test]
    fn self_referencing_group_matches_empty() {
        // \1 runs while group 1 is half-open; it must match zero bytes.
        let (end, caps) = run_pattern("(\\1a)", b"aa", 0).unwrap();
        assert_eq!(end, 1);
        assert_eq!(caps[1], (Some(0), Some(1)));
    }

    #[test]
    fn greedy_star_consumes_most() {
        let (end, _) = run_pattern("a*", b"aaab", 0).unwrap();
        assert_eq!(end, 3);
        let (end, _) = run_pattern("a*?", b"aaab", 0).unwrap();
        assert_eq!(end, 0);
    }
}
