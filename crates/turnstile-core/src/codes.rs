//! Unit code and access code generation.
//!
//! Codes are drawn uniformly from [`CODE_ALPHABET`] by the thread-local
//! CSPRNG, so they carry no ordering and reveal nothing about each other.
//! Uniqueness is not checked here; the stores reject a duplicate with
//! `CodeCollision` and the caller draws again.

use rand::seq::IndexedRandom;
use turnstile_types::code::{MAX_CODE_LEN, MIN_CODE_LEN};

use crate::config::CodeConfig;

/// Upper-case letters and digits without the look-alikes `0 O 1 I L U`.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Source of fresh codes.
pub trait CodeGenerator: Send + Sync {
    /// A new candidate unit code, already in normalized form.
    fn unit_code(&self) -> String;

    /// A new candidate agent access code.
    fn access_code(&self) -> String;
}

/// Random codes of configured length.
#[derive(Debug, Clone, Copy)]
pub struct RandomCodes {
    unit_len: usize,
    access_len: usize,
}

impl RandomCodes {
    /// Build a generator from the code settings.
    ///
    /// The unit length is clamped to what scanned input may be.
    pub fn new(config: &CodeConfig) -> Self {
        Self {
            unit_len: config.unit_code_length.clamp(MIN_CODE_LEN, MAX_CODE_LEN),
            access_len: config.access_code_length.max(MIN_CODE_LEN),
        }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new(&CodeConfig::default())
    }
}

impl CodeGenerator for RandomCodes {
    fn unit_code(&self) -> String {
        random_code(self.unit_len)
    }

    fn access_code(&self) -> String {
        random_code(self.access_len)
    }
}

fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .filter_map(|_| CODE_ALPHABET.choose(&mut rng))
        .map(|b| char::from(*b))
        .collect()
}
