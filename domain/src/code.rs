//! Short code generation.

use rand::Rng;

use crate::{CodeGenerator, ShortCode};

/// The 62-symbol alphabet generated codes are drawn from.
pub const ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Longest code the generator will produce.
pub const MAX_CODE_LEN: usize = 32;

/// Returns true if every byte of `s` is in [`ALPHABET`].
pub fn is_alphabet_only(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Draws each symbol uniformly from [`ALPHABET`] using the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, len: usize) -> ShortCode {
        let len = len.clamp(1, MAX_CODE_LEN);
        let mut rng = rand::thread_rng();
        let s: String = (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        // Alphabet symbols are always a valid code
        ShortCode(s)
    }
}
