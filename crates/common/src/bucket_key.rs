//! Server-generated bucket keys of the form `ABC-XYZ-12`.
//!
//! Keys are drawn from the operating system CSPRNG. The key space is
//! small (26^6 * 100) so uniqueness is enforced by the catalog, not here.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketKey(String);

#[derive(Debug, thiserror::Error)]
#[error("malformed bucket key: {0:?}")]
pub struct BucketKeyError(String);

impl BucketKey {
    /// Draw a fresh key from the OS random source.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut key = String::with_capacity(10);
        for _ in 0..3 {
            key.push(pick(rng, LETTERS));
        }
        key.push('-');
        for _ in 0..3 {
            key.push(pick(rng, LETTERS));
        }
        key.push('-');
        for _ in 0..2 {
            key.push(pick(rng, DIGITS));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// gen_range samples uniformly, so no modulo bias across the alphabet
fn pick<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8]) -> char {
    alphabet[rng.gen_range(0..alphabet.len())] as char
}

impl FromStr for BucketKey {
    type Err = BucketKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split('-').collect();
        let well_formed = match groups.as_slice() {
            [a, b, n] => {
                a.len() == 3
                    && b.len() == 3
                    && n.len() == 2
                    && a.bytes().chain(b.bytes()).all(|c| c.is_ascii_uppercase())
                    && n.bytes().all(|c| c.is_ascii_digit())
            }
            _ => false,
        };

        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(BucketKeyError(s.to_string()))
        }
    }
}

impl TryFrom<String> for BucketKey {
    type Error = BucketKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BucketKey> for String {
    fn from(key: BucketKey) -> Self {
        key.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
