//! Hand-assembled stored-block streams must round-trip exactly.

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|chunks: Vec<Vec<u8>>| {
    let mut stream = Vec::new();
    let mut expected = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let chunk = &chunk[..chunk.len().min(0xFFFF)];
        let len = chunk.len() as u16;
        stream.push(u8::from(i + 1 == chunks.len()));
        stream.extend_from_slice(&len.to_le_bytes());
        stream.extend_from_slice(&(!len).to_le_bytes());
        stream.extend_from_slice(chunk);
        expected.extend_from_slice(chunk);
    }
    if chunks.is_empty() {
        stream.extend_from_slice(&[0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }

    assert_eq!(inflex::inflate_to_vec(&stream).unwrap(), expected);

    let mut exact = vec![0; expected.len()];
    inflex::inflate_into(&mut exact, &stream).unwrap();
    assert_eq!(exact, expected);
});
