//! Pattern parser: byte string to AST.
//!
//! The grammar is an ASCII-only ECMAScript subset. The parser is strict where
//! ECMAScript is lenient: every metacharacter outside a small bare-literal set
//! must be escaped, stray quantifiers are errors, and malformed bounds or
//! escapes fail construction instead of silently matching themselves.

use std::error::Error;
use std::fmt;

/// Construction-time pattern rejection. Matching itself never fails; a regex
/// that parses is a regex that runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternError {
    /// Byte offset of the offending construct within the pattern.
    pub position: usize,
    pub message: &'static str,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (at pattern offset {})", self.message, self.position)
    }
}

impl Error for PatternError {}

/// Character classes are half-open byte ranges, normalized (sorted, merged,
/// no empties). The upper bound reaches 256 so "any byte" is representable.
pub(crate) type ClassRanges = Vec<(u16, u16)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// Matches the bytes exactly. Adjacent literals are merged while parsing.
    Literal(Vec<u8>),
    /// Matches one byte inside any of the ranges. An empty list never matches.
    Class(ClassRanges),
    Sequence(Vec<Node>),
    /// Alternation, right-nested: `a|b|c` is `Choice(a, Choice(b, c))`.
    Choice(Box<Node>, Box<Node>),
    Repeat {
        greedy: bool,
        min: usize,
        /// `usize::MAX` means unbounded.
        max: usize,
        inner: Box<Node>,
    },
    CaptureStart(usize),
    CaptureEnd(usize),
    Backreference(usize),
    /// `^` (end = false) or `$` (end = true).
    Anchor { end: bool },
    /// `\b` (expect = true) or `\B` (expect = false).
    WordBoundary { expect: bool },
    Lookahead { positive: bool, inner: Box<Node> },
    /// The empty sequence; matches everywhere.
    Nothing,
}

/// Parses a whole pattern. Returns the tree and the number of groups,
/// counting the implicit whole-match group 0.
pub(crate) fn parse(pattern: &[u8]) -> Result<(Node, usize), PatternError> {
    let mut parser = Parser {
        pattern,
        pos: 0,
        n_capture: 1,
    };
    let node = parser.parse_disjunction()?;
    if parser.pos != pattern.len() {
        return Err(parser.error_at(parser.pos, "unbalanced parenthesis"));
    }
    Ok((node, parser.n_capture))
}

/// Bytes that may appear unescaped outside a class. Everything else either
/// has a meaning or must be written `\x`-escaped.
fn is_bare_literal(b: u8) -> bool {
    matches!(b,
        b' '..=b'#' | b'%'..=b'\'' | b',' | b'-' | b'/' | b'0'..=b'9'
        | b':'..=b'>' | b'@' | b'A'..=b'Z' | b'_' | b'`' | b'a'..=b'z'
        | b'~' | 0x80..=0xFF)
}

/// Punctuation that escapes to itself, in or out of a class.
fn is_simple_escape(b: u8) -> bool {
    matches!(b, b'!'..=b'/' | b':'..=b'@' | b'['..=b'`' | b'{'..=b'~' | 0x80..=0xFF)
}

fn hex_value(b: u8) -> Option<u16> {
    match b {
        b'0'..=b'9' => Some(u16::from(b - b'0')),
        b'A'..=b'F' => Some(u16::from(b - b'A') + 10),
        b'a'..=b'f' => Some(u16::from(b - b'a') + 10),
        _ => None,
    }
}

fn digit_ranges() -> ClassRanges {
    vec![(u16::from(b'0'), u16::from(b'9') + 1)]
}

fn word_ranges() -> ClassRanges {
    vec![
        (u16::from(b'0'), u16::from(b'9') + 1),
        (u16::from(b'A'), u16::from(b'Z') + 1),
        (u16::from(b'_'), u16::from(b'_') + 1),
        (u16::from(b'a'), u16::from(b'z') + 1),
    ]
}

fn space_ranges() -> ClassRanges {
    // Tab through carriage return, plus the space itself.
    vec![(0x09, 0x0E), (u16::from(b' '), u16::from(b' ') + 1)]
}

/// Sorts, merges overlapping or adjacent ranges, and drops empty ones.
pub(crate) fn normalize_ranges(mut ranges: ClassRanges) -> ClassRanges {
    ranges.retain(|&(lo, hi)| lo < hi);
    ranges.sort_unstable();
    let mut merged: ClassRanges = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Complements a normalized range set against [0, 256).
pub(crate) fn invert_ranges(ranges: &[(u16, u16)]) -> ClassRanges {
    let mut out = Vec::with_capacity(ranges.len() + 1);
    let mut prev = 0;
    for &(lo, hi) in ranges {
        if prev < lo {
            out.push((prev, lo));
        }
        prev = hi;
    }
    if prev < 256 {
        out.push((prev, 256));
    }
    out
}

fn named_class(letter: u8) -> ClassRanges {
    let base = match letter.to_ascii_lowercase() {
        b'd' => digit_ranges(),
        b's' => space_ranges(),
        b'w' => word_ranges(),
        _ => unreachable!(),
    };
    if letter.is_ascii_uppercase() {
        invert_ranges(&base)
    } else {
        base
    }
}

fn class_node(ranges: ClassRanges) -> Node {
    let ranges = normalize_ranges(ranges);
    // A one-byte class is just that byte.
    if let [(lo, hi)] = ranges[..] {
        if hi == lo + 1 {
            return Node::Literal(vec![lo as u8]);
        }
    }
    Node::Class(ranges)
}

/// Splices a term into a sequence under construction, flattening nested
/// sequences and merging adjacent literals.
fn push_term(seq: &mut Vec<Node>, node: Node) {
    match node {
        Node::Nothing => {}
        Node::Sequence(items) => {
            for item in items {
                push_term(seq, item);
            }
        }
        Node::Literal(bytes) => {
            if let Some(Node::Literal(prev)) = seq.last_mut() {
                prev.extend_from_slice(&bytes);
            } else {
                seq.push(Node::Literal(bytes));
            }
        }
        other => seq.push(other),
    }
}

/// A class item is either a plain byte (a legal range endpoint) or a set of
/// ranges from a named escape (not a legal range endpoint).
enum ClassItem {
    Byte(u8),
    Ranges(ClassRanges),
}

struct Parser<'a> {
    pattern: &'a [u8],
    pos: usize,
    /// Groups opened so far, plus one for the whole match. Backreferences
    /// must point below this.
    n_capture: usize,
}

impl<'a> Parser<'a> {
    fn error_at(&self, position: usize, message: &'static str) -> PatternError {
        PatternError { position, message }
    }

    fn peek(&self) -> Option<u8> {
        self.pattern.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_disjunction(&mut self) -> Result<Node, PatternError> {
        let first = self.parse_sequence()?;
        if self.eat(b'|') {
            let rest = self.parse_disjunction()?;
            Ok(Node::Choice(Box::new(first), Box::new(rest)))
        } else {
            Ok(first)
        }
    }

    fn parse_sequence(&mut self) -> Result<Node, PatternError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None | Some(b')') | Some(b'|') => break,
                _ => {}
            }
            let term_pos = self.pos;
            let (term, repeatable) = self.parse_term()?;
            let term = self.parse_quantifier(term, repeatable, term_pos)?;
            push_term(&mut items, term);
        }
        Ok(match items.len() {
            0 => Node::Nothing,
            1 => items.pop().unwrap(),
            _ => Node::Sequence(items),
        })
    }

    fn parse_term(&mut self) -> Result<(Node, bool), PatternError> {
        let pos = self.pos;
        let b = self.next().unwrap();
        match b {
            b'(' => self.parse_group(pos),
            b'^' => Ok((Node::Anchor { end: false }, false)),
            b'$' => Ok((Node::Anchor { end: true }, false)),
            b'.' => {
                // Anything but a newline.
                let nl = u16::from(b'\n');
                Ok((Node::Class(vec![(0, nl), (nl + 1, 256)]), true))
            }
            b'[' => Ok((self.parse_class(pos)?, true)),
            b'\\' => self.parse_term_escape(pos),
            b'*' | b'+' | b'?' | b'{' => Err(self.error_at(pos, "nothing to repeat")),
            b if is_bare_literal(b) => Ok((Node::Literal(vec![b]), true)),
            _ => Err(self.error_at(pos, "this character must be escaped")),
        }
    }

    fn parse_group(&mut self, open_pos: usize) -> Result<(Node, bool), PatternError> {
        if !self.eat(b'?') {
            let id = self.n_capture;
            self.n_capture += 1;
            let inner = self.parse_disjunction()?;
            self.expect_close(open_pos)?;
            let mut items = vec![Node::CaptureStart(id)];
            push_term(&mut items, inner);
            items.push(Node::CaptureEnd(id));
            return Ok((Node::Sequence(items), true));
        }
        match self.next() {
            Some(b':') => {
                let inner = self.parse_disjunction()?;
                self.expect_close(open_pos)?;
                Ok((inner, true))
            }
            Some(kind @ (b'=' | b'!')) => {
                let inner = self.parse_disjunction()?;
                self.expect_close(open_pos)?;
                let node = Node::Lookahead {
                    positive: kind == b'=',
                    inner: Box::new(inner),
                };
                Ok((node, false))
            }
            Some(b'<') => match self.next() {
                Some(b'=' | b'!') => {
                    // Parsed for error positioning, then rejected.
                    let _ = self.parse_disjunction()?;
                    self.expect_close(open_pos)?;
                    Err(self.error_at(open_pos, "lookbehind is not implemented"))
                }
                _ => Err(self.error_at(open_pos, "unknown group type")),
            },
            _ => Err(self.error_at(open_pos, "unknown group type")),
        }
    }

    fn expect_close(&mut self, open_pos: usize) -> Result<(), PatternError> {
        if self.eat(b')') {
            Ok(())
        } else {
            Err(self.error_at(open_pos, "unterminated group"))
        }
    }

    fn parse_quantifier(
        &mut self,
        term: Node,
        repeatable: bool,
        term_pos: usize,
    ) -> Result<Node, PatternError> {
        let quant_pos = self.pos;
        let (min, max) = match self.peek() {
            Some(b'?') => {
                self.pos += 1;
                (0, 1)
            }
            Some(b'*') => {
                self.pos += 1;
                (0, usize::MAX)
            }
            Some(b'+') => {
                self.pos += 1;
                (1, usize::MAX)
            }
            Some(b'{') => {
                self.pos += 1;
                self.parse_bounds(quant_pos)?
            }
            _ => return Ok(term),
        };
        if !repeatable {
            return Err(self.error_at(term_pos, "cannot repeat this term"));
        }
        let greedy = !self.eat(b'?');
        Ok(Node::Repeat {
            greedy,
            min,
            max,
            inner: Box::new(term),
        })
    }

    /// Parses `m}`, `m,}` or `m,n}` after the opening brace.
    fn parse_bounds(&mut self, quant_pos: usize) -> Result<(usize, usize), PatternError> {
        let min = self.parse_number(quant_pos)?;
        let max = if self.eat(b',') {
            if self.peek() == Some(b'}') {
                usize::MAX
            } else {
                self.parse_number(quant_pos)?
            }
        } else {
            min
        };
        if !self.eat(b'}') {
            return Err(self.error_at(quant_pos, "malformed repeat bound"));
        }
        if min > max {
            return Err(self.error_at(quant_pos, "repeat bound out of order"));
        }
        Ok((min, max))
    }

    fn parse_number(&mut self, err_pos: usize) -> Result<usize, PatternError> {
        let start = self.pos;
        let mut value: usize = 0;
        while let Some(d @ b'0'..=b'9') = self.peek() {
            self.pos += 1;
            value = value
                .saturating_mul(10)
                .saturating_add(usize::from(d - b'0'));
        }
        if self.pos == start {
            return Err(self.error_at(err_pos, "malformed repeat bound"));
        }
        Ok(value)
    }

    fn parse_term_escape(&mut self, esc_pos: usize) -> Result<(Node, bool), PatternError> {
        let b = match self.next() {
            Some(b) => b,
            None => return Err(self.error_at(esc_pos, "truncated escape")),
        };
        let node = match b {
            b'0' => {
                if matches!(self.peek(), Some(b'0'..=b'9')) {
                    return Err(self.error_at(esc_pos, "octal escapes are not supported"));
                }
                Node::Literal(vec![0])
            }
            b'1'..=b'9' => {
                let mut n = usize::from(b - b'0');
                while let Some(d @ b'0'..=b'9') = self.peek() {
                    self.pos += 1;
                    n = n.saturating_mul(10).saturating_add(usize::from(d - b'0'));
                }
                if n >= self.n_capture {
                    return Err(self.error_at(esc_pos, "backreference to nonexistent group"));
                }
                Node::Backreference(n)
            }
            b'b' => return Ok((Node::WordBoundary { expect: true }, false)),
            b'B' => return Ok((Node::WordBoundary { expect: false }, false)),
            b'c' => match self.next() {
                Some(x) => Node::Literal(vec![x & 0x1F]),
                None => return Err(self.error_at(esc_pos, "truncated escape")),
            },
            b'x' => Node::Literal(vec![self.parse_hex_escape(esc_pos)?]),
            b'd' | b'D' | b's' | b'S' | b'w' | b'W' => class_node(named_class(b)),
            b'f' => Node::Literal(vec![0x0C]),
            b'n' => Node::Literal(vec![b'\n']),
            b'r' => Node::Literal(vec![b'\r']),
            b't' => Node::Literal(vec![b'\t']),
            b'v' => Node::Literal(vec![0x0B]),
            b if is_simple_escape(b) => Node::Literal(vec![b]),
            _ => return Err(self.error_at(esc_pos, "unknown escape")),
        };
        Ok((node, true))
    }

    fn parse_hex_escape(&mut self, esc_pos: usize) -> Result<u8, PatternError> {
        let hi = self.next().and_then(hex_value);
        let lo = self.next().and_then(hex_value);
        match (hi, lo) {
            (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
            _ => Err(self.error_at(esc_pos, "invalid hex escape")),
        }
    }

    fn parse_class(&mut self, class_pos: usize) -> Result<Node, PatternError> {
        let negate = self.eat(b'^');
        let mut ranges: ClassRanges = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(class_pos, "unterminated character class")),
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            let item_pos = self.pos;
            match self.parse_class_item()? {
                // A named class cannot anchor a range; a '-' after one is a
                // plain member, picked up on the next iteration.
                ClassItem::Ranges(rs) => ranges.extend(rs),
                ClassItem::Byte(lo) => {
                    let is_range = self.peek() == Some(b'-')
                        && self.pattern.get(self.pos + 1) != Some(&b']')
                        && self.pos + 1 != self.pattern.len();
                    if is_range {
                        self.pos += 1;
                        let hi_pos = self.pos;
                        let hi = match self.parse_class_item()? {
                            ClassItem::Byte(hi) => hi,
                            ClassItem::Ranges(_) => {
                                return Err(self.error_at(
                                    hi_pos,
                                    "class range endpoint must be a single character",
                                ));
                            }
                        };
                        if hi < lo {
                            return Err(self.error_at(item_pos, "class range out of order"));
                        }
                        ranges.push((u16::from(lo), u16::from(hi) + 1));
                    } else {
                        ranges.push((u16::from(lo), u16::from(lo) + 1));
                    }
                }
            }
        }
        if negate {
            ranges = invert_ranges(&normalize_ranges(ranges));
        }
        Ok(class_node(ranges))
    }

    fn parse_class_item(&mut self) -> Result<ClassItem, PatternError> {
        let item_pos = self.pos;
        let b = self.next().unwrap();
        if b != b'\\' {
            return Ok(ClassItem::Byte(b));
        }
        let e = match self.next() {
            Some(e) => e,
            None => return Err(self.error_at(item_pos, "truncated escape")),
        };
        let byte = match e {
            // Inside a class, \b is a backspace and \0 is a plain NUL.
            b'b' => 0x08,
            b'0' => 0x00,
            b'c' => match self.next() {
                Some(x) if x.is_ascii_alphabetic() => x & 0x1F,
                _ => return Err(self.error_at(item_pos, "invalid control escape")),
            },
            b'x' => self.parse_hex_escape(item_pos)?,
            b'd' | b'D' | b's' | b'S' | b'w' | b'W' => {
                return Ok(ClassItem::Ranges(named_class(e)));
            }
            b'f' => 0x0C,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0B,
            e if is_simple_escape(e) => e,
            _ => return Err(self.error_at(item_pos, "unknown escape")),
        };
        Ok(ClassItem::Byte(byte))
    }
}
