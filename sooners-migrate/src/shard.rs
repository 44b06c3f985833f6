//! Shard weights: spreading new rows across shard entities.
//!
//! Every shard entity carries a row count in `sooners_shard_weight`; a new
//! row's shard is drawn at random with weight `(max_count - count) + 1`,
//! so emptier shards fill faster.

use rand::Rng;
use smol_str::SmolStr;

/// One shard entity's weight row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardWeight {
    /// Logical shard table name.
    pub name: SmolStr,
    /// Shard suffix.
    pub suffix: SmolStr,
    /// Rows currently in this entity.
    pub count: i64,
}

impl ShardWeight {
    /// The allocation weight against the fullest entity.
    pub fn weight(&self, max_count: i64) -> i64 {
        (max_count - self.count) + 1
    }
}

/// Pick a shard entity at random, weighted toward emptier entities.
/// Returns `None` for an empty pool.
pub fn choose_by_weight<'a, R: Rng>(
    rng: &mut R,
    weights: &'a [ShardWeight],
) -> Option<&'a ShardWeight> {
    let max_count = weights.iter().map(|weight| weight.count).max()?;
    let sum: i64 = weights
        .iter()
        .map(|weight| weight.weight(max_count))
        .sum();
    let mut offset = rng.gen_range(0..sum);
    for weight in weights {
        let share = weight.weight(max_count);
        if offset < share {
            return Some(weight);
        }
        offset -= share;
    }
    // gen_range keeps offset below the sum of shares.
    unreachable!()
}
