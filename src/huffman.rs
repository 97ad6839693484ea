//! Canonical Huffman decoding tables.
//!
//! A table is a flat `[u16]` holding a 9-bit first level (512 entries)
//! followed by chained 3-bit sub-tables (8 entries each). Each entry packs,
//! from the top bit down:
//!
//! - bit 15: set for a link to a sub-table, clear for a leaf
//! - bits 14..=11: total bits consumed along this path
//! - leaf: bits 8..=0 hold the decoded symbol
//! - link: bits 10..=0 hold the base index of the next sub-table
//!
//! Symbols are at most 9 bits wide, so leaves never collide with the link
//! flag. The end-of-block symbol 256 is stored with bit 7 set (giving 384) so
//! the main decode loop can tell literals, lengths and end-of-block apart
//! with plain comparisons.

const FAST_BITS: u32 = 9;
const SLOW_BITS: u32 = 3;

/// Worst-case table sizes for each alphabet, verified by `max_table_size` in
/// the tests below. Undersubscribed trees never exceed the complete worst
/// case because the zlib compatibility rule only admits trees with at most
/// one code.
pub(crate) const TABLE_SIZE_LITLEN: usize = 1760;
pub(crate) const TABLE_SIZE_DIST: usize = 608;
pub(crate) const TABLE_SIZE_CODELEN: usize = 560;

/// Builds the decoding table for the given code lengths (zero meaning the
/// symbol does not occur). Returns false if the lengths do not describe a
/// usable tree.
///
/// `bad_symbol` is the leaf stored in every slot no valid code reaches, with
/// a consumed count of zero; the decode loop rejects it by value. Dynamic
/// callers pass one past their alphabet, the fixed tables are fully populated
/// and pass 0.
///
/// Oversubscribed trees are always rejected. Undersubscribed trees follow the
/// zlib rule: legal only with a single one-bit code or no code at all, and
/// never for the code-length alphabet (`bad_symbol` 19). zlib shipped that
/// rule first and the streams in the wild are written against it.
pub(crate) fn build_table(out: &mut [u16], lengths: &[u8], bad_symbol: u16) -> bool {
    let mut n_len = [0u32; 16];
    for &len in lengths {
        n_len[len as usize] += 1;
    }

    // A length-n code covers 0x10000 >> n of the 16-bit code space.
    let mut bits_start = [0u16; 16];
    let mut used_bits: u32 = 0;
    for n in 1..16 {
        bits_start[n] = used_bits as u16;
        used_bits += (0x10000 >> n) * n_len[n];
    }

    if used_bits != 0x10000 {
        if used_bits > 0x10000 {
            return false;
        }
        if used_bits != n_len[1] << 15 {
            return false;
        }
        if bad_symbol == 19 {
            return false;
        }
    }

    let mut out_tree = 1usize << FAST_BITS;
    for slot in &mut out[..out_tree] {
        *slot = 0xFFFF;
    }

    for (symbol, &len) in lengths.iter().enumerate() {
        let mut n_bits = u32::from(len);
        if n_bits == 0 {
            continue;
        }

        // Canonical codes are assigned MSB-first, the bit reader is
        // LSB-first, so flip the code before slotting it in.
        let mut bits = bits_start[n_bits as usize].reverse_bits();
        bits_start[n_bits as usize] =
            bits_start[n_bits as usize].wrapping_add((0x10000u32 >> n_bits) as u16);

        // Walk (or create) link entries until the rest of the code fits in
        // the current level.
        let mut layer_start = 0usize;
        let mut layer_bits = FAST_BITS;
        let mut bits_used = 0u32;
        while n_bits > layer_bits {
            let idx = layer_start + (bits as usize & ((1 << layer_bits) - 1));
            bits >>= layer_bits;
            n_bits -= layer_bits;
            bits_used += layer_bits;

            if out[idx] == 0xFFFF {
                out[idx] = 0x8000 | ((bits_used as u16) << 11) | out_tree as u16;
                layer_start = out_tree;
                for slot in &mut out[out_tree..out_tree + (1 << SLOW_BITS)] {
                    *slot = 0xFFFF;
                }
                out_tree += 1 << SLOW_BITS;
            } else {
                layer_start = (out[idx] & 0x07FF) as usize;
            }
            layer_bits = SLOW_BITS;
        }

        let mut leaf = ((bits_used + n_bits) as u16) << 11 | symbol as u16;
        if symbol == 256 {
            leaf |= 128;
        }

        // A short code owns every slot whose low bits match it.
        let clones = 1u32 << (layer_bits - n_bits);
        for clone in 0..clones {
            let idx =
                layer_start + ((clone << n_bits) as usize | bits as usize & ((1 << n_bits) - 1));
            out[idx] = leaf;
        }
    }

    if used_bits != 0x10000 {
        for slot in &mut out[..out_tree] {
            if *slot == 0xFFFF {
                *slot = bad_symbol;
            }
        }
    }

    true
}

/// One decode step against a built table. The caller must have refilled the
/// bit buffer first; on underflow the result is garbage and `nbits` wraps
/// negative, which the caller checks afterwards.
#[inline(always)]
pub(crate) fn decode(table: &[u16], bits: &mut u64, nbits: &mut u32) -> u32 {
    let mut entry = table[(*bits & ((1 << FAST_BITS) - 1)) as usize];
    while entry & 0x8000 != 0 {
        let consumed = (entry >> 11) & 15;
        let base = (entry & 0x07FF) as usize;
        entry = table[base + ((*bits >> consumed) & ((1 << SLOW_BITS) - 1)) as usize];
    }
    let consumed = u32::from(entry >> 11) & 15;
    *bits >>= consumed;
    *nbits = nbits.wrapping_sub(consumed);
    u32::from(entry & 0x01FF)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Table size for the most sub-table-hungry tree over `num_syms` symbols,
    /// found by greedily splitting the leaf closest to spawning a new
    /// sub-table, then measuring how far the builder actually wrote.
    fn max_table_size(num_syms: usize) -> usize {
        let mut dist_to_next_layer = [0u8; 16];
        let mut to_next = FAST_BITS as i32;
        for bits in 0..15 {
            dist_to_next_layer[bits] = to_next as u8;
            to_next -= 1;
            if to_next < 0 {
                to_next = SLOW_BITS as i32;
            }
        }
        // Can't split a length-15 leaf, and splitting length 14 only helps if
        // it directly spawns a new sub-table.
        let mut bits = 15;
        loop {
            dist_to_next_layer[bits] = 100;
            bits -= 1;
            if dist_to_next_layer[bits] == 1 {
                break;
            }
        }

        let mut syms_for_bits = [0u16; 16];
        syms_for_bits[0] = 1;
        let mut num_unused_syms = num_syms - 1;

        for len in 0..=15 {
            if syms_for_bits[len] != 0 && dist_to_next_layer[len] < 100 {
                syms_for_bits[len] -= 1;
                syms_for_bits[len + 1] += 2;
                num_unused_syms -= 1;
            }
        }

        while num_unused_syms > 0 {
            let mut best_split = 15;
            for i in 0..15 {
                if syms_for_bits[i] == 0 {
                    continue;
                }
                if dist_to_next_layer[i] < dist_to_next_layer[best_split] {
                    best_split = i;
                }
            }
            if best_split == 15 {
                break;
            }
            syms_for_bits[best_split] -= 1;
            syms_for_bits[best_split + 1] += 2;
            num_unused_syms -= 1;
        }

        let mut lengths = Vec::with_capacity(num_syms);
        for (len, &n) in syms_for_bits.iter().enumerate() {
            for _ in 0..n {
                lengths.push(len as u8);
            }
        }
        assert_eq!(lengths.len(), num_syms);

        let mut table = vec![0xFFFFu16; 2048];
        assert!(build_table(&mut table, &lengths, 0));
        table.iter().position(|&entry| entry == 0xFFFF).unwrap()
    }

    fn build(lengths: &[u8], bad_symbol: u16) -> Option<Vec<u16>> {
        let mut table = vec![0u16; TABLE_SIZE_LITLEN];
        if build_table(&mut table, lengths, bad_symbol) {
            Some(table)
        } else {
            None
        }
    }

    fn decode_one(table: &[u16], code: u64) -> (u32, u32) {
        let mut bits = code;
        let mut nbits = 32;
        let symbol = decode(table, &mut bits, &mut nbits);
        (symbol, 32 - nbits)
    }

    #[test]
    fn size_constants_are_worst_case() {
        assert_eq!(max_table_size(286), TABLE_SIZE_LITLEN);
        assert_eq!(max_table_size(30), TABLE_SIZE_DIST);
        assert_eq!(max_table_size(19), TABLE_SIZE_CODELEN);
    }

    #[test]
    fn simple_table() {
        // Canonical codes: a=0, b=10, c=11 (MSB-first).
        let table = build(&[1, 2, 2], 3).unwrap();
        assert_eq!(decode_one(&table, 0b110), (0, 1));
        assert_eq!(decode_one(&table, 0b101), (1, 2));
        assert_eq!(decode_one(&table, 0b011), (2, 2));
    }

    #[test]
    fn long_codes_chain_subtables() {
        // A ladder from 1 to 15 bits exercises two chained sub-table levels
        // past the 9-bit fast level.
        let lengths = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 15];
        let table = build(&lengths, 287).unwrap();
        assert_eq!(decode_one(&table, 0b0), (0, 1));
        let code = (0b111111111111110u64).reverse_bits() >> (64 - 15);
        assert_eq!(decode_one(&table, code), (14, 15));
        assert_eq!(decode_one(&table, 0x7FFF), (15, 15));
    }

    #[test]
    fn end_of_block_is_remapped() {
        let lengths = crate::tables::fixed_litlen_lengths();
        let mut table = vec![0u16; TABLE_SIZE_LITLEN];
        assert!(build_table(&mut table, &lengths, 0));
        // The fixed code for 256 is seven zero bits.
        assert_eq!(decode_one(&table, 0), (384, 7));
        // The fixed code for 'a' is 0x30 + 0x61 over eight bits.
        let code = (0x91u64).reverse_bits() >> (64 - 8);
        assert_eq!(decode_one(&table, code), (0x61, 8));
    }

    #[test]
    fn oversubscribed_rejected() {
        assert!(build(&[1, 1, 1], 3).is_none());
        assert!(build(&[1, 2, 2, 2], 4).is_none());
    }

    #[test]
    fn undersubscribed_follows_zlib_rule() {
        // A single one-bit code is fine outside the code-length alphabet.
        let table = build(&[0, 1, 0], 3).unwrap();
        assert_eq!(decode_one(&table, 0b0), (1, 1));
        // Unreachable slots decode to the bad symbol, consuming nothing.
        assert_eq!(decode_one(&table, 0b1), (3, 0));

        // So is an empty tree.
        let table = build(&[0, 0, 0], 3).unwrap();
        assert_eq!(decode_one(&table, 0b0), (3, 0));

        // Two codes that leave a gap are not.
        assert!(build(&[2, 2, 0], 3).is_none());
        // Neither is a single code longer than one bit.
        assert!(build(&[0, 2, 0], 3).is_none());

        // The code-length alphabet never gets the exemption.
        let mut lengths = [0u8; 19];
        lengths[0] = 1;
        let mut table = vec![0u16; TABLE_SIZE_CODELEN];
        assert!(!build_table(&mut table, &lengths, 19));
    }
}
