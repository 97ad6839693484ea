//! A resumable DEFLATE (RFC 1951) decompressor.

use crate::huffman;
use crate::tables::{fixed_dist_lengths, fixed_litlen_lengths, CLCL_ORDER, LEN_DETAIL};

/// An error encountered while decompressing a deflate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateError {
    /// A block used the reserved block type 3.
    BadBlockType,
    /// The LEN and NLEN fields of a stored block disagree.
    BadStoredLength,
    /// A dynamic block declared code lengths that do not form a usable
    /// Huffman tree.
    BadHuffmanTable,
    /// A dynamic block header is malformed: too many symbols, a repeat code
    /// with nothing to repeat, or a repeat past the declared count.
    BadCodeLengths,
    /// The stream used a bit sequence no symbol is assigned to, or ran dry in
    /// the middle of a symbol.
    BadSymbol,
    /// A match reaches further back than 32768 bytes, or past the start of
    /// the available output history.
    BadDistance,
    /// The input ended before the stream did.
    UnexpectedEof,
    /// There is input left over after the final block.
    TrailingData,
    /// The output buffer handed to [`inflate_into`] or [`zlib_inflate_into`]
    /// does not match the decompressed size exactly.
    ///
    /// [`zlib_inflate_into`]: crate::zlib_inflate_into
    OutputSizeMismatch,
    /// The zlib header is malformed: wrong compression method, a preset
    /// dictionary, or a failed check ratio.
    BadZlibHeader,
    /// The Adler-32 checksum in the zlib trailer does not match the output.
    BadChecksum,
}

impl std::fmt::Display for InflateError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let desc = match self {
            InflateError::BadBlockType => "reserved block type",
            InflateError::BadStoredLength => "corrupt stored block length",
            InflateError::BadHuffmanTable => "invalid Huffman table",
            InflateError::BadCodeLengths => "invalid code lengths",
            InflateError::BadSymbol => "invalid symbol",
            InflateError::BadDistance => "invalid match distance",
            InflateError::UnexpectedEof => "unexpected end of input",
            InflateError::TrailingData => "trailing data after final block",
            InflateError::OutputSizeMismatch => "output buffer size mismatch",
            InflateError::BadZlibHeader => "invalid zlib header",
            InflateError::BadChecksum => "zlib checksum mismatch",
        };
        f.write_str(desc)
    }
}

impl std::error::Error for InflateError {}

/// Why [`Inflator::inflate`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The final block has been fully decoded.
    Done,
    /// All input was consumed and more is needed.
    NeedInput,
    /// The output buffer is full.
    NeedOutput,
}

#[derive(Debug, Clone, Copy)]
enum State {
    BlockInit,
    StoredHeader,
    StoredBody { remaining: u32 },
    DynHeader,
    DynCodeLengths { sizes: u32 },
    DynSymbolLengths { sizes: u32, index: u32 },
    MainLoop,
    LiteralPending { byte: u8 },
    CopyPending { length: u32, distance: u32 },
    Done,
    Failed(InflateError),
}

/// Per-call positions plus the persistent bit buffer, kept together so the
/// hot loop works on locals and writes back once per call.
struct Cursor {
    bits: u64,
    nbits: u32,
    in_pos: usize,
    out_pos: usize,
}

impl Cursor {
    /// Tops the buffer up past 32 bits if a whole word is available, else
    /// drains the input byte by byte.
    ///
    /// Must not run once `nbits` has wrapped negative, since the shift count
    /// would be huge; every possible underflow leaves bit 5 set, so the
    /// first test already covers that.
    fn refill_fast(&mut self, input: &[u8]) {
        if self.nbits & 32 != 0 {
            return;
        }
        if input.len() - self.in_pos >= 4 {
            let word = u32::from_le_bytes(input[self.in_pos..self.in_pos + 4].try_into().unwrap());
            self.bits |= u64::from(word) << self.nbits;
            self.nbits += 32;
            self.in_pos += 4;
        } else {
            self.refill_all(input);
        }
    }

    fn refill_all(&mut self, input: &[u8]) {
        while self.in_pos < input.len() && self.nbits <= 56 {
            self.bits |= u64::from(input[self.in_pos]) << self.nbits;
            self.in_pos += 1;
            self.nbits += 8;
        }
    }

    /// Takes `n` bits from the buffer. On underflow the result is garbage
    /// and `nbits` wraps negative; callers check afterwards.
    fn take(&mut self, n: u32) -> u32 {
        let ret = (self.bits & ((1u64 << n) - 1)) as u32;
        self.nbits = self.nbits.wrapping_sub(n);
        self.bits >>= n;
        ret
    }

    fn align_to_byte(&mut self) {
        self.bits >>= self.nbits & 7;
        self.nbits &= !7;
    }
}

/// A streaming deflate decompressor.
///
/// [`inflate`](Self::inflate) can be called any number of times, with input
/// and output supplied in arbitrarily small pieces. Matches look back up to
/// 32768 bytes, so a caller rotating output buffers must pass the previous
/// buffer back in as history.
///
/// For whole buffers, [`inflate_to_vec`] and [`inflate_into`] are easier.
pub struct Inflator {
    state: State,
    final_block: bool,
    last_input: bool,
    bit_buffer: u64,
    nbits: u32,
    litlen_table: [u16; huffman::TABLE_SIZE_LITLEN],
    dist_table: [u16; huffman::TABLE_SIZE_DIST],
    codelen_table: [u16; huffman::TABLE_SIZE_CODELEN],
    symbol_lengths: [u8; 318],
}

impl Default for Inflator {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflator {
    pub fn new() -> Inflator {
        Inflator {
            state: State::BlockInit,
            final_block: false,
            last_input: false,
            bit_buffer: 0,
            nbits: 0,
            litlen_table: [0; huffman::TABLE_SIZE_LITLEN],
            dist_table: [0; huffman::TABLE_SIZE_DIST],
            codelen_table: [0; huffman::TABLE_SIZE_CODELEN],
            symbol_lengths: [0; 318],
        }
    }

    /// Decompresses as much as possible.
    ///
    /// `output[..output_position]` must hold the data already produced into
    /// this buffer; new bytes are written from `output_position` onwards.
    /// `prev_output` is the tail of the output produced before this buffer
    /// (empty if this is the first), consulted when a match reaches back past
    /// the buffer start. `last_input` says no input will follow this slice;
    /// once set it is latched.
    ///
    /// Returns the status plus how many input bytes were consumed and output
    /// bytes produced. Errors are sticky, and [`Status::Done`] keeps being
    /// returned (consuming nothing) once reached.
    pub fn inflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        output_position: usize,
        prev_output: &[u8],
        last_input: bool,
    ) -> Result<(Status, usize, usize), InflateError> {
        match self.state {
            State::Done => return Ok((Status::Done, 0, 0)),
            State::Failed(err) => return Err(err),
            _ => {}
        }
        if last_input {
            self.last_input = true;
        }
        assert!(output_position <= output.len());

        let mut cur = Cursor {
            bits: self.bit_buffer,
            nbits: self.nbits,
            in_pos: 0,
            out_pos: output_position,
        };
        let result = self.run(input, output, prev_output, &mut cur);
        self.bit_buffer = cur.bits;
        self.nbits = cur.nbits;
        match result {
            Ok(status) => Ok((status, cur.in_pos, cur.out_pos - output_position)),
            Err(err) => {
                self.state = State::Failed(err);
                Err(err)
            }
        }
    }

    /// Whole bytes sitting in the bit buffer, i.e. input handed over but not
    /// part of the deflate stream.
    pub fn unused_input(&self) -> usize {
        (self.nbits / 8) as usize
    }

    // The zlib envelope reads its header and trailer through the same bit
    // buffer the deflate stream uses, so leftover bytes flow naturally
    // between the layers.

    pub(crate) fn buffered_bits(&self) -> u32 {
        self.nbits
    }

    /// Byte-refills the bit buffer; returns how much input was consumed.
    pub(crate) fn refill_bits(&mut self, input: &[u8]) -> usize {
        let mut cur = Cursor {
            bits: self.bit_buffer,
            nbits: self.nbits,
            in_pos: 0,
            out_pos: 0,
        };
        cur.refill_all(input);
        self.bit_buffer = cur.bits;
        self.nbits = cur.nbits;
        cur.in_pos
    }

    /// Takes `n` buffered bits; the caller must have checked availability.
    pub(crate) fn take_bits(&mut self, n: u32) -> u32 {
        debug_assert!(self.nbits >= n);
        let ret = (self.bit_buffer & ((1u64 << n) - 1)) as u32;
        self.bit_buffer >>= n;
        self.nbits -= n;
        ret
    }

    pub(crate) fn align_bits(&mut self) {
        self.bit_buffer >>= self.nbits & 7;
        self.nbits &= !7;
    }

    fn suspend(&mut self, state: State) -> Result<Status, InflateError> {
        self.state = state;
        if self.last_input {
            Err(InflateError::UnexpectedEof)
        } else {
            Ok(Status::NeedInput)
        }
    }

    fn run(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        prev_output: &[u8],
        cur: &mut Cursor,
    ) -> Result<Status, InflateError> {
        loop {
            match self.state {
                State::BlockInit => {
                    cur.refill_fast(input);
                    // an empty fixed-huffman block is 3 + 7 bits
                    if cur.nbits < 3 + 7 {
                        return self.suspend(State::BlockInit);
                    }
                    let header = cur.take(3);
                    self.final_block = header & 1 != 0;
                    match header >> 1 {
                        0 => {
                            cur.align_to_byte();
                            self.state = State::StoredHeader;
                        }
                        1 => {
                            huffman::build_table(&mut self.dist_table, &fixed_dist_lengths(), 0);
                            huffman::build_table(
                                &mut self.litlen_table,
                                &fixed_litlen_lengths(),
                                0,
                            );
                            self.state = State::MainLoop;
                        }
                        2 => self.state = State::DynHeader,
                        _ => return Err(InflateError::BadBlockType),
                    }
                }

                State::StoredHeader => {
                    cur.refill_fast(input);
                    if cur.nbits < 32 {
                        return self.suspend(State::StoredHeader);
                    }
                    let mut len = cur.bits as u32;
                    len ^= (!len) << 16;
                    if len >= 0x10000 {
                        return Err(InflateError::BadStoredLength);
                    }
                    cur.bits >>= 32;
                    cur.nbits -= 32;
                    self.state = State::StoredBody { remaining: len };
                }

                State::StoredBody { remaining } => {
                    let mut len = remaining;
                    // whole bytes may still be sitting in the bit buffer
                    while cur.nbits != 0 && len != 0 {
                        if cur.out_pos == output.len() {
                            self.state = State::StoredBody { remaining: len };
                            return Ok(Status::NeedOutput);
                        }
                        output[cur.out_pos] = cur.take(8) as u8;
                        cur.out_pos += 1;
                        len -= 1;
                    }

                    let n = (len as usize)
                        .min(input.len() - cur.in_pos)
                        .min(output.len() - cur.out_pos);
                    output[cur.out_pos..cur.out_pos + n]
                        .copy_from_slice(&input[cur.in_pos..cur.in_pos + n]);
                    len -= n as u32;
                    cur.in_pos += n;
                    cur.out_pos += n;

                    if len != 0 {
                        if cur.in_pos == input.len() {
                            return self.suspend(State::StoredBody { remaining: len });
                        }
                        self.state = State::StoredBody { remaining: len };
                        return Ok(Status::NeedOutput);
                    }

                    if self.final_block {
                        self.state = State::Done;
                        return Ok(Status::Done);
                    }
                    self.state = State::BlockInit;
                }

                State::DynHeader => {
                    cur.refill_fast(input);
                    if cur.nbits < 5 + 5 + 4 {
                        return self.suspend(State::DynHeader);
                    }
                    let sizes = cur.take(5 + 5 + 4);
                    self.state = State::DynCodeLengths { sizes };
                }

                State::DynCodeLengths { sizes } => {
                    let hlit = (sizes & 31) + 257;
                    let hdist = ((sizes >> 5) & 31) + 1;
                    let hclen = (sizes >> 10) + 4;

                    // deflate can express 288 literal and 32 distance codes,
                    // but only 286 and 30 are valid; zlib rejects the rest
                    if hlit > 286 || hdist > 30 {
                        return Err(InflateError::BadCodeLengths);
                    }

                    cur.refill_all(input);
                    if cur.nbits < hclen * 3 {
                        return self.suspend(State::DynCodeLengths { sizes });
                    }

                    let mut codelen_lengths = [0u8; 19];
                    for &symbol in CLCL_ORDER.iter().take(hclen as usize) {
                        codelen_lengths[symbol] = cur.take(3) as u8;
                    }
                    if !huffman::build_table(&mut self.codelen_table, &codelen_lengths, 19) {
                        return Err(InflateError::BadHuffmanTable);
                    }
                    self.state = State::DynSymbolLengths { sizes, index: 0 };
                }

                State::DynSymbolLengths { sizes, index } => {
                    let hlit = ((sizes & 31) + 257) as usize;
                    let hdist = (((sizes >> 5) & 31) + 1) as usize;
                    let total = hlit + hdist;

                    let mut i = index as usize;
                    while i < total {
                        cur.refill_fast(input);
                        // worst case is a 15-bit code plus 7 extra bits; on
                        // the final input, running dry reads zeroes, which
                        // either errors out or terminates, so the underflow
                        // check can wait until after the decode
                        if cur.nbits < 15 + 7 && !self.last_input {
                            return self.suspend(State::DynSymbolLengths {
                                sizes,
                                index: i as u32,
                            });
                        }

                        let sym =
                            huffman::decode(&self.codelen_table, &mut cur.bits, &mut cur.nbits);
                        if (cur.nbits as i32) < 0 {
                            return Err(InflateError::BadSymbol);
                        }

                        if sym <= 15 {
                            self.symbol_lengths[i] = sym as u8;
                            i += 1;
                        } else if sym == 16 {
                            let n_rep = cur.take(2) as usize + 3;
                            if i == 0 {
                                return Err(InflateError::BadCodeLengths);
                            }
                            if i + n_rep > total {
                                return Err(InflateError::BadCodeLengths);
                            }
                            let last = self.symbol_lengths[i - 1];
                            for _ in 0..n_rep {
                                self.symbol_lengths[i] = last;
                                i += 1;
                            }
                        } else {
                            // 17 or 18; the table cannot produce anything else
                            let n_rep =
                                (cur.take((sym - 17) * 4 + 3) + (sym - 17) * 8 + 3) as usize;
                            if i + n_rep > total {
                                return Err(InflateError::BadCodeLengths);
                            }
                            for _ in 0..n_rep {
                                self.symbol_lengths[i] = 0;
                                i += 1;
                            }
                        }
                    }

                    if !huffman::build_table(
                        &mut self.litlen_table,
                        &self.symbol_lengths[..hlit],
                        287,
                    ) {
                        return Err(InflateError::BadHuffmanTable);
                    }
                    if !huffman::build_table(
                        &mut self.dist_table,
                        &self.symbol_lengths[hlit..total],
                        31,
                    ) {
                        return Err(InflateError::BadHuffmanTable);
                    }
                    self.state = State::MainLoop;
                }

                State::MainLoop | State::LiteralPending { .. } | State::CopyPending { .. } => {
                    // finish whatever ran out of output space last time
                    if let State::LiteralPending { byte } = self.state {
                        if cur.out_pos == output.len() {
                            return Ok(Status::NeedOutput);
                        }
                        output[cur.out_pos] = byte;
                        cur.out_pos += 1;
                        self.state = State::MainLoop;
                    }
                    if let State::CopyPending { length, distance } = self.state {
                        if let Some(left) =
                            copy_match(output, &mut cur.out_pos, prev_output, length, distance)?
                        {
                            self.state = State::CopyPending {
                                length: left,
                                distance,
                            };
                            return Ok(Status::NeedOutput);
                        }
                        self.state = State::MainLoop;
                    }

                    loop {
                        // a symbol needs at most 15 (litlen) + 5 (length
                        // bits) + 15 (dist) + 13 (distance bits) = 48 bits
                        if input.len() - cur.in_pos >= 8 {
                            if cur.nbits <= 32 {
                                let word = u32::from_le_bytes(
                                    input[cur.in_pos..cur.in_pos + 4].try_into().unwrap(),
                                );
                                cur.bits |= u64::from(word) << cur.nbits;
                                cur.nbits += 32;
                                cur.in_pos += 4;
                            }
                        } else {
                            cur.refill_all(input);
                            if cur.nbits < 48 && !self.last_input {
                                self.state = State::MainLoop;
                                return Ok(Status::NeedInput);
                            }
                        }

                        let symbol =
                            huffman::decode(&self.litlen_table, &mut cur.bits, &mut cur.nbits);
                        if (cur.nbits as i32) < 0 {
                            return Err(InflateError::BadSymbol);
                        }

                        if symbol < 256 {
                            if cur.out_pos == output.len() {
                                self.state = State::LiteralPending { byte: symbol as u8 };
                                return Ok(Status::NeedOutput);
                            }
                            output[cur.out_pos] = symbol as u8;
                            cur.out_pos += 1;
                        } else if symbol <= 285 {
                            let detail = LEN_DETAIL[(symbol - 257) as usize];
                            let length =
                                cur.take(u32::from(detail >> 12)) + u32::from(detail & 511);

                            // a wrapped bit count never passes the first
                            // test, so an underflowed buffer is not refilled
                            if cur.nbits < 15 + 13 && input.len() - cur.in_pos >= 4 {
                                let word = u32::from_le_bytes(
                                    input[cur.in_pos..cur.in_pos + 4].try_into().unwrap(),
                                );
                                cur.bits |= u64::from(word) << cur.nbits;
                                cur.nbits += 32;
                                cur.in_pos += 4;
                            }

                            let dist_key =
                                huffman::decode(&self.dist_table, &mut cur.bits, &mut cur.nbits);
                            let dist_base = ((2 + (dist_key & 1)) << (dist_key >> 1) >> 1)
                                + u32::from(dist_key != 0);
                            let dist_bits = (dist_key >> 1) - u32::from(dist_key >= 2);
                            let distance = cur.take(dist_bits) + dist_base;

                            // keys 30 and 31 land past the window
                            if distance > 32768 {
                                return Err(InflateError::BadDistance);
                            }
                            if (cur.nbits as i32) < 0 {
                                return Err(InflateError::BadSymbol);
                            }

                            if let Some(left) =
                                copy_match(output, &mut cur.out_pos, prev_output, length, distance)?
                            {
                                self.state = State::CopyPending {
                                    length: left,
                                    distance,
                                };
                                return Ok(Status::NeedOutput);
                            }
                        } else if symbol == 384 {
                            break;
                        } else {
                            return Err(InflateError::BadSymbol);
                        }
                    }

                    if self.final_block {
                        self.state = State::Done;
                        return Ok(Status::Done);
                    }
                    self.state = State::BlockInit;
                }

                State::Done | State::Failed(_) => unreachable!(),
            }
        }
    }
}

/// Copies a match, clamped to the output buffer. Returns how much is left if
/// the buffer filled up first.
fn copy_match(
    output: &mut [u8],
    out_pos: &mut usize,
    prev_output: &[u8],
    length: u32,
    distance: u32,
) -> Result<Option<u32>, InflateError> {
    let mut pos = *out_pos;
    let mut len = length as usize;
    let dist = distance as usize;

    if dist > pos {
        // reaches back past this buffer, into the previous one
        let dist_prev = dist - pos;
        if dist_prev > prev_output.len() {
            return Err(InflateError::BadDistance);
        }
        let src = prev_output.len() - dist_prev;
        let n = len.min(dist_prev).min(output.len() - pos);
        output[pos..pos + n].copy_from_slice(&prev_output[src..src + n]);
        pos += n;
        len -= n;
        if len == 0 || pos == output.len() {
            *out_pos = pos;
            return Ok(if len != 0 { Some(len as u32) } else { None });
        }
        // the previous buffer ran out; the rest reads from the start of this
        // one, and pos == dist now holds
    }

    // the source may overlap the destination, so go byte by byte
    while len != 0 && pos != output.len() {
        output[pos] = output[pos - dist];
        pos += 1;
        len -= 1;
    }
    *out_pos = pos;
    Ok(if len != 0 { Some(len as u32) } else { None })
}

/// Decompresses a whole deflate stream into a fresh Vec.
pub fn inflate_to_vec(input: &[u8]) -> Result<Vec<u8>, InflateError> {
    let mut inflator = Inflator::new();
    let mut output = vec![0; 4096.max(input.len().saturating_mul(8))];
    let mut in_pos = 0;
    let mut out_pos = 0;
    loop {
        let (status, consumed, produced) =
            inflator.inflate(&input[in_pos..], &mut output, out_pos, &[], true)?;
        in_pos += consumed;
        out_pos += produced;
        match status {
            Status::Done => break,
            Status::NeedOutput => {
                let len = output.len();
                output.resize(len * 2, 0);
            }
            Status::NeedInput => return Err(InflateError::UnexpectedEof),
        }
    }
    if input.len() - in_pos + inflator.unused_input() != 0 {
        return Err(InflateError::TrailingData);
    }
    output.truncate(out_pos);
    Ok(output)
}

/// Decompresses a whole deflate stream into an exactly sized buffer.
pub fn inflate_into(output: &mut [u8], input: &[u8]) -> Result<(), InflateError> {
    let mut inflator = Inflator::new();
    let (status, consumed, produced) = inflator.inflate(input, output, 0, &[], true)?;
    match status {
        Status::Done => {}
        Status::NeedOutput => return Err(InflateError::OutputSizeMismatch),
        Status::NeedInput => return Err(InflateError::UnexpectedEof),
    }
    if produced != output.len() {
        return Err(InflateError::OutputSizeMismatch);
    }
    if input.len() - consumed + inflator.unused_input() != 0 {
        return Err(InflateError::TrailingData);
    }
    Ok(())
}
