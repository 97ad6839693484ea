//! Resumable deflate decompression and a small regex engine.
//!
//! The decompression half is a streaming RFC 1951 inflater built around a
//! hand-rolled two-level Huffman decoder. It can suspend and resume at any
//! input or output boundary, remembers a caller-provided previous window for
//! matches reaching behind the current buffer, and comes with a zlib
//! (RFC 1950) envelope that verifies the Adler-32 trailer.
//!
//! The regex half compiles an ECMAScript-subset pattern at runtime into a
//! flat backtracking program with full capture-group semantics, including
//! backreferences and lookahead.

mod decompress;
mod huffman;
mod regex;
mod tables;
mod zlib;

pub use decompress::{inflate_into, inflate_to_vec, InflateError, Inflator, Status};
pub use regex::{Match, PatternError, Regex};
pub use zlib::{zlib_inflate_into, zlib_inflate_to_vec, ZlibInflator};
