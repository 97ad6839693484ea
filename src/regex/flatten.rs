//! Lowers the AST into a flat program of bridges.
//!
//! A bridge is a sequence of stones followed by an exit (accept or jump). A
//! stone either matches at the current position or fails; backtracking never
//! re-enters a stone. The only branch point is `Backup`, which records a
//! bridge to retry if everything after it fails.

use super::parse::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Stone {
    Literal(Vec<u8>),
    Class(Vec<(u16, u16)>),
    CaptureStart(usize),
    CaptureEnd(usize),
    /// Unsets the listed groups. Emitted on the untaken side of a choice and
    /// after a negative lookahead, so stale writes from failed attempts do
    /// not leak into the result.
    CaptureDelete(Vec<usize>),
    Backreference(usize),
    Anchor { end: bool },
    WordBoundary { expect: bool },
    /// The inner program runs against the same text and capture array; only
    /// whether it matched is consumed here.
    Lookahead { positive: bool, program: Program },
    /// On failure of everything after this stone, restore captures and
    /// continue from the given bridge.
    Backup(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Accept,
    Jump(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Bridge {
    pub stones: Vec<Stone>,
    pub exit: Exit,
}

/// Execution starts at bridge 0. Every `Jump` and `Backup` target is a valid
/// bridge index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Program {
    pub bridges: Vec<Bridge>,
}

pub(crate) fn flatten(node: &Node) -> Program {
    let frag = process(0, node);
    debug_assert_eq!(frag.start, 0);
    Program {
        bridges: frag.bridges,
    }
}

/// A partial program: bridges numbered `start..start + bridges.len()`, plus
/// the set of groups closed inside it (what a `CaptureDelete` must clear when
/// the fragment is skipped).
struct Frag {
    start: usize,
    bridges: Vec<Bridge>,
    captures: Vec<usize>,
}

impl Frag {
    fn leaf(start: usize, stone: Stone, captures: Vec<usize>) -> Frag {
        Frag {
            start,
            bridges: vec![Bridge {
                stones: vec![stone],
                exit: Exit::Accept,
            }],
            captures,
        }
    }

    fn empty_accept(start: usize) -> Frag {
        Frag {
            start,
            bridges: vec![Bridge {
                stones: Vec::new(),
                exit: Exit::Accept,
            }],
            captures: Vec::new(),
        }
    }

    fn last_bridge(&self) -> usize {
        self.start + self.bridges.len() - 1
    }

    /// Prepends a stone to the first bridge. An empty `CaptureDelete` is
    /// dropped rather than prepended.
    fn prefix(mut self, stone: Stone) -> Frag {
        if let Stone::CaptureDelete(groups) = &stone {
            if groups.is_empty() {
                return self;
            }
        }
        self.bridges[0].stones.insert(0, stone);
        self
    }

    fn replace_accept(mut self, exit: Exit) -> Frag {
        for bridge in &mut self.bridges {
            if bridge.exit == Exit::Accept {
                bridge.exit = exit;
            }
        }
        self
    }

    /// Accepting bridges get `stone` appended and their exit replaced.
    fn replace_accept2(mut self, stone: Stone, exit: Exit) -> Frag {
        for bridge in &mut self.bridges {
            if bridge.exit == Exit::Accept {
                bridge.stones.push(stone.clone());
                bridge.exit = exit;
            }
        }
        self
    }

    fn concat(mut self, other: Frag) -> Frag {
        debug_assert_eq!(other.start, self.start + self.bridges.len());
        self.bridges.extend(other.bridges);
        self.captures.extend(other.captures);
        self
    }

    /// Appends a bare accepting bridge.
    fn concat_accept(self) -> Frag {
        let next = self.start + self.bridges.len();
        self.concat(Frag::empty_accept(next))
    }
}

/// Joins two sequential fragments. A single accepting bridge is spliced
/// directly onto the follower (which was numbered to start at the same id);
/// anything larger has its accepts rewritten to jump to the follower.
fn combine_seq(mut first: Frag, mut next: Frag) -> Frag {
    if first.bridges.len() == 1 && first.bridges[0].exit == Exit::Accept && next.start == first.start
    {
        let mut stones = first.bridges.pop().unwrap().stones;
        stones.append(&mut next.bridges[0].stones);
        next.bridges[0].stones = stones;
        first.captures.extend(next.captures);
        Frag {
            start: first.start,
            bridges: next.bridges,
            captures: first.captures,
        }
    } else {
        let target = next.start;
        first.replace_accept(Exit::Jump(target)).concat(next)
    }
}

fn process(start: usize, node: &Node) -> Frag {
    match node {
        Node::Literal(bytes) => Frag::leaf(start, Stone::Literal(bytes.clone()), Vec::new()),
        Node::Class(ranges) => Frag::leaf(start, Stone::Class(ranges.clone()), Vec::new()),
        Node::CaptureStart(n) => Frag::leaf(start, Stone::CaptureStart(*n), Vec::new()),
        Node::CaptureEnd(n) => Frag::leaf(start, Stone::CaptureEnd(*n), vec![*n]),
        Node::Backreference(n) => Frag::leaf(start, Stone::Backreference(*n), Vec::new()),
        Node::Anchor { end } => Frag::leaf(start, Stone::Anchor { end: *end }, Vec::new()),
        Node::WordBoundary { expect } => {
            Frag::leaf(start, Stone::WordBoundary { expect: *expect }, Vec::new())
        }
        Node::Nothing => Frag::empty_accept(start),
        Node::Sequence(items) => process_sequence(start, items),
        Node::Choice(a, b) => process_choice(start, a, b),
        Node::Repeat {
            greedy,
            min,
            max,
            inner,
        } => process_repeat(start, *greedy, *min, *max, inner),
        Node::Lookahead { positive, inner } => process_lookahead(start, *positive, inner),
    }
}

fn process_sequence(start: usize, items: &[Node]) -> Frag {
    let (first_node, rest) = match items.split_first() {
        Some(split) => split,
        None => return Frag::empty_accept(start),
    };
    let first = process(start, first_node);
    let next_start = if first.bridges.len() == 1 {
        start
    } else {
        first.last_bridge() + 1
    };
    let next = process_sequence(next_start, rest);
    combine_seq(first, next)
}

// a|b ->
//   0: delete captures of b, backup<1>, ...a..., accept
//   1: delete captures of a, ...b..., accept
fn process_choice(start: usize, a: &Node, b: &Node) -> Frag {
    let first = process(start, a);
    let next = process(first.last_bridge() + 1, b);
    let first_caps = first.captures.clone();
    let next_caps = next.captures.clone();
    let retry = next.start;
    let first = first
        .prefix(Stone::Backup(retry))
        .prefix(Stone::CaptureDelete(next_caps));
    let next = next.prefix(Stone::CaptureDelete(first_caps));
    first.concat(next)
}

fn process_repeat(start: usize, greedy: bool, min: usize, max: usize, inner: &Node) -> Frag {
    const INF: usize = usize::MAX;
    match (greedy, min, max) {
        (_, 0, 0) => Frag::empty_accept(start),
        // a? ->
        //   0: backup<1>, 'a', accept
        //   1: accept
        (true, 0, 1) => {
            let inner = process(start, inner);
            let end = inner.last_bridge() + 1;
            inner.prefix(Stone::Backup(end)).concat_accept()
        }
        // a* ->
        //   0: jump<1>
        //   1: backup<2>, 'a', jump<1>
        //   2: accept
        (true, 0, INF) => {
            let body = process(start + 1, inner);
            let end = body.last_bridge() + 1;
            let body = body
                .prefix(Stone::Backup(end))
                .replace_accept(Exit::Jump(start + 1));
            let entry = Frag {
                start,
                bridges: vec![Bridge {
                    stones: Vec::new(),
                    exit: Exit::Jump(start + 1),
                }],
                captures: Vec::new(),
            };
            entry.concat(body.concat_accept())
        }
        // a+ ->
        //   0: jump<1>
        //   1: 'a', backup<2>, jump<1>
        //   2: accept
        (true, 1, INF) => {
            let body = process(start + 1, inner);
            let end = body.last_bridge() + 1;
            let body = body.replace_accept2(Stone::Backup(end), Exit::Jump(start + 1));
            let entry = Frag {
                start,
                bridges: vec![Bridge {
                    stones: Vec::new(),
                    exit: Exit::Jump(start + 1),
                }],
                captures: Vec::new(),
            };
            entry.concat(body.concat_accept())
        }
        // a{0,5} ->
        //   0: backup<end>, 'a', jump<1>
        //   1..: a{0,4}
        //   end: accept
        (true, 0, n) => {
            let first = process(start, inner);
            let next_start = first.last_bridge() + 1;
            let next = process_repeat(next_start, true, 0, n - 1, inner);
            let end = next.last_bridge() + 1;
            let first = first
                .prefix(Stone::Backup(end))
                .replace_accept(Exit::Jump(next_start));
            first.concat(next).concat_accept()
        }
        // a?? ->
        //   0: backup<1>, jump<2>
        //   1: 'a', jump<2>
        //   2: accept
        (false, 0, 1) => {
            let body = process(start + 1, inner);
            let end = body.last_bridge() + 1;
            let body = body.replace_accept(Exit::Jump(end));
            let entry = Frag {
                start,
                bridges: vec![Bridge {
                    stones: vec![Stone::Backup(start + 1)],
                    exit: Exit::Jump(end),
                }],
                captures: Vec::new(),
            };
            entry.concat(body.concat_accept())
        }
        // a*? ->
        //   0: backup<1>, jump<2>
        //   1: 'a', backup<1>, jump<2>
        //   2: accept
        (false, 0, INF) => {
            let body = process(start + 1, inner);
            let end = body.last_bridge() + 1;
            let body = body.replace_accept2(Stone::Backup(start + 1), Exit::Jump(end));
            let entry = Frag {
                start,
                bridges: vec![Bridge {
                    stones: vec![Stone::Backup(start + 1)],
                    exit: Exit::Jump(end),
                }],
                captures: Vec::new(),
            };
            entry.concat(body.concat_accept())
        }
        // a+? ->
        //   0: jump<1>
        //   1: 'a', backup<1>, jump<2>
        //   2: accept
        (false, 1, INF) => {
            let body = process(start + 1, inner);
            let end = body.last_bridge() + 1;
            let body = body.replace_accept2(Stone::Backup(start + 1), Exit::Jump(end));
            let entry = Frag {
                start,
                bridges: vec![Bridge {
                    stones: Vec::new(),
                    exit: Exit::Jump(start + 1),
                }],
                captures: Vec::new(),
            };
            entry.concat(body.concat_accept())
        }
        // a{0,5}? ->
        //   0: backup<1>, jump<end>
        //   1: 'a', jump into a{0,4}
        //   2..: a{0,4}
        //   end: accept
        (false, 0, n) => {
            let body = process(start + 1, inner);
            let rest_start = body.last_bridge() + 1;
            let rest = process_repeat(rest_start, false, 0, n - 1, inner);
            let end = rest.last_bridge() + 1;
            let body = body.replace_accept(Exit::Jump(rest_start));
            let entry = Frag {
                start,
                bridges: vec![Bridge {
                    stones: vec![Stone::Backup(start + 1)],
                    exit: Exit::Jump(end),
                }],
                captures: Vec::new(),
            };
            entry.concat(body).concat(rest).concat_accept()
        }
        // a{5,10} and a{5,10}? -> one mandatory iteration, then a{4,9}.
        (_, m, n) => {
            let first = process(start, inner);
            let next_start = first.last_bridge() + 1;
            let next = process_repeat(
                next_start,
                greedy,
                m - 1,
                if n == INF { INF } else { n - 1 },
                inner,
            );
            let first = first.replace_accept(Exit::Jump(next_start));
            first.concat(next)
        }
    }
}

fn process_lookahead(start: usize, positive: bool, inner: &Node) -> Frag {
    let inner_frag = process(0, inner);
    let inner_caps = inner_frag.captures;
    let program = Program {
        bridges: inner_frag.bridges,
    };
    let mut stones = vec![Stone::Lookahead { positive, program }];
    let captures = if positive {
        inner_caps
    } else {
        // A failed inner attempt may have written captures before failing;
        // clear them once the lookahead as a whole succeeds.
        if !inner_caps.is_empty() {
            stones.push(Stone::CaptureDelete(inner_caps));
        }
        Vec::new()
    };
    Frag {
        start,
        bridges: vec![Bridge {
            stones,
            exit: Exit::Accept,
        }],
        captures,
    }
}
