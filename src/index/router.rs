//! Deterministic document-to-shard routing.

/// Route a document id to a shard: sum of the id's codepoints mod the shard
/// count. Depends only on `id` and `shard_count`, which is fixed for an
/// index's lifetime between open and close.
pub fn shard_of(id: &str, shard_count: u32) -> u32 {
    if shard_count <= 1 {
        return 0;
    }
    let sum: u64 = id.chars().map(|c| c as u64).sum();
    (sum % u64::from(shard_count)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_codepoint_sum() {
        // (97 + 98 + 99) mod 4 = 294 mod 4 = 2
        assert_eq!(shard_of("abc", 4), 2);
        assert_eq!(shard_of("", 4), 0);
        assert_eq!(shard_of("abc", 1), 0);
    }

    #[test]
    fn routing_is_stable() {
        for id in ["x", "user-42", "ÅngstrÖm", "日本語"] {
            let first = shard_of(id, 7);
            for _ in 0..8 {
                assert_eq!(shard_of(id, 7), first);
            }
            assert!(first < 7);
        }
    }
}
