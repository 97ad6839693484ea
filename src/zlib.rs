//! The zlib (RFC 1950) envelope: a two-byte header, a deflate stream, and a
//! big-endian Adler-32 trailer.

use simd_adler32::Adler32;

use crate::decompress::{InflateError, Inflator, Status};

#[derive(Debug, Clone, Copy)]
enum Stage {
    Header,
    Body,
    Trailer,
    Done,
    Failed(InflateError),
}

/// A streaming zlib decompressor.
///
/// Same calling convention as [`Inflator`]; the checksum of everything
/// produced so far is carried across calls and verified against the trailer.
pub struct ZlibInflator {
    inner: Inflator,
    checksum: Adler32,
    stage: Stage,
}

impl Default for ZlibInflator {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibInflator {
    pub fn new() -> ZlibInflator {
        ZlibInflator {
            inner: Inflator::new(),
            checksum: Adler32::new(),
            stage: Stage::Header,
        }
    }

    /// Decompresses as much as possible; see [`Inflator::inflate`] for the
    /// buffer conventions.
    pub fn inflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        output_position: usize,
        prev_output: &[u8],
        last_input: bool,
    ) -> Result<(Status, usize, usize), InflateError> {
        match self.stage {
            Stage::Done => return Ok((Status::Done, 0, 0)),
            Stage::Failed(err) => return Err(err),
            _ => {}
        }

        let mut in_pos = 0;
        let mut produced = 0;

        if let Stage::Header = self.stage {
            in_pos += self.inner.refill_bits(input);
            if self.inner.buffered_bits() < 16 {
                if last_input {
                    return self.fail(InflateError::UnexpectedEof);
                }
                return Ok((Status::NeedInput, in_pos, 0));
            }
            let head = self.inner.take_bits(16);
            // CM must be 8 (deflate). CINFO is ignored: matches carry their
            // own 32768 bound. FDICT is not supported, and FCHECK makes the
            // big-endian header a multiple of 31.
            if head & 0x000F != 0x0008
                || head & 0x2000 != 0
                || u32::from((head as u16).swap_bytes()) % 31 != 0
            {
                return self.fail(InflateError::BadZlibHeader);
            }
            self.stage = Stage::Body;
        }

        if let Stage::Body = self.stage {
            let result = self.inner.inflate(
                &input[in_pos..],
                output,
                output_position,
                prev_output,
                last_input,
            );
            match result {
                Ok((status, consumed, newly)) => {
                    in_pos += consumed;
                    produced = newly;
                    self.checksum
                        .write(&output[output_position..output_position + newly]);
                    if status != Status::Done {
                        return Ok((status, in_pos, produced));
                    }
                    self.stage = Stage::Trailer;
                }
                Err(err) => return self.fail(err),
            }
        }

        self.inner.align_bits();
        in_pos += self.inner.refill_bits(&input[in_pos..]);
        if self.inner.buffered_bits() < 32 {
            if last_input {
                return self.fail(InflateError::UnexpectedEof);
            }
            self.stage = Stage::Trailer;
            return Ok((Status::NeedInput, in_pos, produced));
        }
        // big endian, even though everything else in deflate is little
        let stored = self.inner.take_bits(32).swap_bytes();
        if stored != self.checksum.finish() {
            return self.fail(InflateError::BadChecksum);
        }
        self.stage = Stage::Done;
        Ok((Status::Done, in_pos, produced))
    }

    /// Whole bytes handed over but not part of the zlib stream.
    pub fn unused_input(&self) -> usize {
        self.inner.unused_input()
    }

    fn fail(&mut self, err: InflateError) -> Result<(Status, usize, usize), InflateError> {
        self.stage = Stage::Failed(err);
        Err(err)
    }
}

/// Decompresses a whole zlib stream into a fresh Vec.
pub fn zlib_inflate_to_vec(input: &[u8]) -> Result<Vec<u8>, InflateError> {
    let mut inflator = ZlibInflator::new();
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

/// Decompresses a whole zlib stream into an exactly sized buffer.
pub fn zlib_inflate_into(output: &mut [u8], input: &[u8]) -> Result<(), InflateError> {
    let mut inflator = ZlibInflator::new();
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

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// One input byte and one output byte of room at a time.
    fn inflate_dribble(input: &[u8]) -> Result<Vec<u8>, InflateError> {
        let mut inflator = ZlibInflator::new();
        let mut output = Vec::new();
        let mut in_pos = 0;
        let mut out_pos = 0;
        loop {
            let end = (in_pos + 1).min(input.len());
            let last = end == input.len();
            let (status, consumed, produced) =
                inflator.inflate(&input[in_pos..end], &mut output, out_pos, &[], last)?;
            in_pos += consumed;
            out_pos += produced;
            match status {
                Status::Done => {
                    output.truncate(out_pos);
                    return Ok(output);
                }
                Status::NeedOutput => output.resize(output.len() + 1, 0),
                Status::NeedInput => assert!(!last),
            }
        }
    }

    #[test]
    fn canonical_empty_stream() {
        // 78 9c is the most common header; the Adler-32 of nothing is 1
        let input = b"\x78\x9c\x03\x00\x00\x00\x00\x01";
        assert_eq!(zlib_inflate_to_vec(input).unwrap(), b"");
        assert_eq!(inflate_dribble(input).unwrap(), b"");
        let mut out = [0u8; 0];
        zlib_inflate_into(&mut out, input).unwrap();
    }

    #[test]
    fn bad_headers() {
        // compression method 7
        assert_eq!(
            zlib_inflate_to_vec(b"\x77\x9c\x03\x00\x00\x00\x00\x01").unwrap_err(),
            InflateError::BadZlibHeader
        );
        // FDICT set (0x7820 is a multiple of 31, so FCHECK passes)
        assert_eq!(
            zlib_inflate_to_vec(b"\x78\x20\x03\x00\x00\x00\x00\x01").unwrap_err(),
            InflateError::BadZlibHeader
        );
        // bad FCHECK
        assert_eq!(
            zlib_inflate_to_vec(b"\x78\x9d\x03\x00\x00\x00\x00\x01").unwrap_err(),
            InflateError::BadZlibHeader
        );
    }

    #[test]
    fn bad_checksum() {
        let mut input = b"\x78\x9c\x03\x00\x00\x00\x00\x01".to_vec();
        *input.last_mut().unwrap() = 2;
        assert_eq!(
            zlib_inflate_to_vec(&input).unwrap_err(),
            InflateError::BadChecksum
        );
    }

    #[test]
    fn truncation_and_trailing() {
        let input = b"\x78\x9c\x03\x00\x00\x00\x00\x01";
        for n in 0..input.len() {
            assert_eq!(
                zlib_inflate_to_vec(&input[..n]).unwrap_err(),
                InflateError::UnexpectedEof
            );
        }
        let mut long = input.to_vec();
        long.push(0);
        assert_eq!(
            zlib_inflate_to_vec(&long).unwrap_err(),
            InflateError::TrailingData
        );
    }

    #[test]
    fn roundtrip_miniz() {
        let mut rng = rand::thread_rng();
        for _ in 0..8 {
            let len = rng.gen_range(0..50_000);
            let mut data = vec![0u8; len];
            let mut run = 0u8;
            for byte in &mut data {
                if rng.gen_range(0..4) == 0 {
                    run = rng.gen();
                }
                *byte = run;
            }
            for level in [0, 1, 6] {
                let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&data, level);
                assert_eq!(zlib_inflate_to_vec(&compressed).unwrap(), data);
                // the checksum must accumulate identically when the output
                // arrives one byte at a time
                assert_eq!(inflate_dribble(&compressed).unwrap(), data);

                let mut exact = vec![0u8; data.len()];
                zlib_inflate_into(&mut exact, &compressed).unwrap();
                assert_eq!(exact, data);
            }
        }
    }
}
