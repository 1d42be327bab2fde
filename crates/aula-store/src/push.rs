//! Push key generation.
//!
//! Keys are 20 characters: 8 encoding the creation time in milliseconds,
//! followed by 12 random characters. The alphabet is ordered so that keys
//! sort lexicographically by creation time; keys minted within the same
//! millisecond (or after a clock step backwards) reuse the previous random
//! suffix incremented by one, keeping the sequence strictly ascending.

use rand::Rng;

/// 64-character alphabet, ASCII-ordered.
const ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_CHARS: usize = 8;
const SUFFIX_CHARS: usize = 12;

#[derive(Debug)]
pub struct PushKeyGen {
    last_millis: i64,
    suffix: [u8; SUFFIX_CHARS],
}

impl PushKeyGen {
    pub fn new() -> Self {
        Self {
            last_millis: -1,
            suffix: [0; SUFFIX_CHARS],
        }
    }

    pub fn next_key(&mut self) -> String {
        let now = chrono::Utc::now().timestamp_millis();

        if now <= self.last_millis {
            // Same millisecond (or clock regression): bump the suffix.
            for slot in self.suffix.iter_mut().rev() {
                if *slot < 63 {
                    *slot += 1;
                    break;
                }
                *slot = 0;
            }
        } else {
            self.last_millis = now;
            let mut rng = rand::thread_rng();
            for slot in self.suffix.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut key = vec![0u8; TIMESTAMP_CHARS + SUFFIX_CHARS];
        let mut millis = self.last_millis;
        for i in (0..TIMESTAMP_CHARS).rev() {
            key[i] = ALPHABET[(millis % 64) as usize];
            millis /= 64;
        }
        for (i, slot) in self.suffix.iter().enumerate() {
            key[TIMESTAMP_CHARS + i] = ALPHABET[*slot as usize];
        }

        String::from_utf8(key).expect("alphabet is ASCII")
    }
}

impl Default for PushKeyGen {
    fn default() -> Self {
        Self::new()
    }
}
