//! Placement strategies for keys the index cannot place.
//!
//! Both strategies keep sticky placement; they only differ in which alive
//! shard a fresh or displaced key tries first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How the router orders candidate shards for a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Scan shards in ordinal order
    #[default]
    Linear,
    /// Try `alive[fnv1a(key) % alive_count]` first, then scan in order
    Hash,
}

impl Placement {
    /// Ordinals to try for `key`, given the alive flag of every shard.
    ///
    /// Dead shards never appear in the result.
    pub fn candidates(&self, key: &str, alive: &[bool]) -> Vec<usize> {
        let mut order: Vec<usize> = alive
            .iter()
            .enumerate()
            .filter_map(|(i, &is_alive)| is_alive.then_some(i))
            .collect();

        if let Placement::Hash = self {
            if !order.is_empty() {
                let preferred = (fnv1a(key.as_bytes()) % order.len() as u64) as usize;
                let first = order.remove(preferred);
                order.insert(0, first);
            }
        }

        order
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Linear => write!(f, "linear"),
            Placement::Hash => write!(f, "hash"),
        }
    }
}

impl FromStr for Placement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Placement::Linear),
            "hash" => Ok(Placement::Hash),
            other => Err(Error::Config(format!("unknown placement: {}", other))),
        }
    }
}

/// 64-bit FNV-1a
#[inline]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_linear_skips_dead_shards() {
        let order = Placement::Linear.candidates("k", &[false, true, false, true]);
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn test_hash_prefers_hashed_alive_shard() {
        let alive = [true, false, true, true];
        let order = Placement::Hash.candidates("some-key", &alive);

        let alive_ordinals = [0, 2, 3];
        let preferred = alive_ordinals[(fnv1a(b"some-key") % 3) as usize];
        assert_eq!(order[0], preferred);
        assert_eq!(order.len(), 3);

        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 2, 3]);
    }

    #[test]
    fn test_no_alive_shards() {
        assert!(Placement::Linear.candidates("k", &[false, false]).is_empty());
        assert!(Placement::Hash.candidates("k", &[false, false]).is_empty());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("linear".parse::<Placement>().unwrap(), Placement::Linear);
        assert_eq!("HASH".parse::<Placement>().unwrap(), Placement::Hash);
        assert!("ring".parse::<Placement>().is_err());
        assert_eq!(Placement::Hash.to_string(), "hash");
    }
}
