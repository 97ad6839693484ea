/// Order in which the code-length alphabet's own code lengths are stored in a
/// dynamic block header (RFC 1951 section 3.2.7).
pub(crate) const CLCL_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base length and extra bit count for length symbols 257..=285, packed as
/// `base | extra_bits << 12`. The base fits in 9 bits (max 258).
#[rustfmt::skip]
pub(crate) const LEN_DETAIL: [u16; 29] = [
      3 | 0 << 12,   4 | 0 << 12,   5 | 0 << 12,   6 | 0 << 12,
      7 | 0 << 12,   8 | 0 << 12,   9 | 0 << 12,  10 | 0 << 12,
     11 | 1 << 12,  13 | 1 << 12,  15 | 1 << 12,  17 | 1 << 12,
     19 | 2 << 12,  23 | 2 << 12,  27 | 2 << 12,  31 | 2 << 12,
     35 | 3 << 12,  43 | 3 << 12,  51 | 3 << 12,  59 | 3 << 12,
     67 | 4 << 12,  83 | 4 << 12,  99 | 4 << 12, 115 | 4 << 12,
    131 | 5 << 12, 163 | 5 << 12, 195 | 5 << 12, 227 | 5 << 12,
    258 | 0 << 12,
];

/// Code lengths of the fixed literal/length table (RFC 1951 section 3.2.6).
pub(crate) fn fixed_litlen_lengths() -> [u8; 288] {
    let mut lengths = [8u8; 288];
    for len in &mut lengths[144..=255] {
        *len = 9;
    }
    for len in &mut lengths[256..=279] {
        *len = 7;
    }
    lengths
}

/// Code lengths of the fixed distance table: five bits for all 32 codes.
pub(crate) fn fixed_dist_lengths() -> [u8; 32] {
    [5; 32]
}
