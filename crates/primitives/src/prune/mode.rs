use crate::{prune::PruneSegment, BlockNumber, PruneSegmentError};
use serde::{Deserialize, Serialize};

/// Prune mode.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneMode {
    /// Prune all blocks.
    Full,
    /// Prune blocks before the `head-N` block number. In other words, keep last N + 1 blocks.
    Distance(u64),
    /// Prune blocks before the specified block number. The specified block number is not pruned.
    Before(BlockNumber),
}

impl PruneMode {
    /// Returns block up to which variant pruning needs to be done, inclusive, according to the
    /// provided tip.
    pub fn prune_target_block(
        &self,
        tip: BlockNumber,
        min_blocks: u64,
        segment: PruneSegment,
    ) -> Result<Option<(BlockNumber, Self)>, PruneSegmentError> {
        let result = match self {
            Self::Full if min_blocks == 0 => Some((tip, *self)),
            // Nothing to prune yet
            Self::Distance(distance) if *distance > tip => None,
            Self::Distance(distance) if *distance >= min_blocks => Some((tip - distance, *self)),
            Self::Before(n) if *n > tip => None,
            Self::Before(0) => None,
            Self::Before(n) if tip - n >= min_blocks => Some((n - 1, *self)),
            _ => return Err(PruneSegmentError::Configuration(segment)),
        };
        Ok(result)
    }

    /// Check if target block should be pruned according to the provided prune mode and tip.
    pub const fn should_prune(&self, block: BlockNumber, tip: BlockNumber) -> bool {
        match self {
            Self::Full => true,
            Self::Distance(distance) => {
                if *distance > tip {
                    return false
                }
                block < tip - *distance
            }
            Self::Before(n) => *n > block,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{prune::PruneSegment, PruneMode, PruneSegmentError};
    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[test]
    fn test_prune_target_block() {
        let tip = 1000;
        let segment = PruneSegment::SenderRecovery;

        let tests = vec![
            (PruneMode::Full, 0, Ok(Some(tip))),
            // Full can't keep any minimum amount of blocks
            (PruneMode::Full, 64, Err(PruneSegmentError::Configuration(segment))),
            // Nothing to prune
            (PruneMode::Distance(tip + 1), 0, Ok(None)),
            (PruneMode::Distance(100), 64, Ok(Some(tip - 100))),
            (PruneMode::Distance(10), 64, Err(PruneSegmentError::Configuration(segment))),
            // Nothing to prune
            (PruneMode::Before(tip + 1), 0, Ok(None)),
            (PruneMode::Before(0), 0, Ok(None)),
            (PruneMode::Before(500), 64, Ok(Some(499))),
            (PruneMode::Before(tip - 1), 64, Err(PruneSegmentError::Configuration(segment))),
        ];

        for (index, (mode, min_blocks, expected_result)) in tests.into_iter().enumerate() {
            assert_eq!(
                mode.prune_target_block(tip, min_blocks, segment),
                expected_result.map(|r| r.map(|b| (b, mode))),
                "Test {} failed",
                index + 1,
            );
        }
    }

    #[test]
    fn test_should_prune() {
        let tip = 1000;
        let should_prune = true;

        let tests = vec![
            (PruneMode::Full, tip, should_prune),
            (PruneMode::Distance(tip + 1), 1, !should_prune),
            (PruneMode::Distance(100), tip - 100, !should_prune),
            (PruneMode::Distance(100), tip - 101, should_prune),
            (PruneMode::Before(tip + 1), 1, should_prune),
            (PruneMode::Before(tip + 1), tip + 1, !should_prune),
        ];

        for (index, (mode, block, expected_result)) in tests.into_iter().enumerate() {
            assert_eq!(mode.should_prune(block, tip), expected_result, "Test {} failed", index + 1,);
        }
    }

    #[test]
    fn prune_mode_deserialize() {
        #[derive(Debug, Deserialize)]
        struct Config {
            a: Option<PruneMode>,
            b: Option<PruneMode>,
            c: Option<PruneMode>,
            d: Option<PruneMode>,
        }

        let toml_str = r#"
        a = "full"
        b = { distance = 10 }
        c = { before = 20 }
    "#;

        assert_matches!(
            toml::from_str(toml_str),
            Ok(Config {
                a: Some(PruneMode::Full),
                b: Some(PruneMode::Distance(10)),
                c: Some(PruneMode::Before(20)),
                d: None
            })
        );
    }
}
