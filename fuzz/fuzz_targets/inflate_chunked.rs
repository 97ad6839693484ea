//! Decompressing in two input chunks with a growing output buffer must agree
//! with the one-shot helper, byte for byte and error for error.

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<u8>, Vec<u8>)| {
    let joined = input.0.iter().chain(&input.1).copied().collect::<Vec<u8>>();
    let full = inflex::inflate_to_vec(&joined);

    let split: Result<Vec<u8>, inflex::InflateError> = (|| {
        let mut inflator = inflex::Inflator::new();
        let mut output = vec![0; 1024];
        let mut in_pos = 0;
        let mut out_pos = 0;
        loop {
            let last = in_pos >= input.0.len();
            let chunk = if last {
                &joined[in_pos..]
            } else {
                &input.0[in_pos..]
            };
            let (status, consumed, produced) =
                inflator.inflate(chunk, &mut output, out_pos, &[], last)?;
            in_pos += consumed;
            out_pos += produced;
            match status {
                inflex::Status::Done => break,
                inflex::Status::NeedOutput => output.resize(out_pos + 32 * 1024, 0),
                inflex::Status::NeedInput => {
                    assert!(!last, "NeedInput after the final chunk");
                    assert!(consumed == chunk.len(), "starved with input left over");
                }
            }
        }
        if joined.len() - in_pos + inflator.unused_input() != 0 {
            return Err(inflex::InflateError::TrailingData);
        }
        output.truncate(out_pos);
        Ok(output)
    })();

    assert_eq!(full, split);
});
