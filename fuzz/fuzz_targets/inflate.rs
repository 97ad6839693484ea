#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &[u8]| {
    match inflex::inflate_to_vec(input) {
        Ok(decompressed) => {
            let reference = miniz_oxide::inflate::decompress_to_vec(input)
                .expect("accepted a stream miniz_oxide rejects");
            assert_eq!(decompressed, reference);
        }
        // miniz tolerates trailing garbage, and the two sides draw the line
        // for malformed tables and symbols slightly differently.
        Err(inflex::InflateError::TrailingData) => {}
        Err(inflex::InflateError::BadHuffmanTable) => {}
        Err(inflex::InflateError::BadCodeLengths) => {}
        Err(inflex::InflateError::BadSymbol) => {}
        Err(inflex::InflateError::BadDistance) => {}
        Err(_) => {
            assert!(miniz_oxide::inflate::decompress_to_vec(input).is_err());
        }
    }
});
