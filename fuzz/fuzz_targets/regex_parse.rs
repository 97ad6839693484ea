//! Pattern compilation must either succeed or fail cleanly, and compiled
//! patterns must not crash while matching.

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|pattern: &str| {
    if pattern.len() > 64 {
        return;
    }
    // Bounded repeats unroll, and nesting them multiplies; a fuzzer-chosen
    // bound is a memory test, not a parser test.
    if pattern.contains('{') {
        return;
    }

    let regex = match inflex::Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => {
            assert!(err.position <= pattern.len());
            return;
        }
    };

    for text in [&b""[..], b"a", b"aA0_ .\nzz", b"\xff\x00\xfe"] {
        if let Some(found) = regex.search(text) {
            assert!(found.start() <= found.end());
            assert!(found.end() <= text.len());
            for n in 0..regex.group_count() {
                let _ = found.group(n);
            }
        }
        let _ = regex.match_at(text, 0);
    }
});
