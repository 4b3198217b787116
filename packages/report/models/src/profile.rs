//! Gamified points and rank derived from a reporter's history.

use serde::{Deserialize, Serialize};

use crate::Report;

/// Point awards and rank curve.
///
/// Loaded from configuration; [`ScoringPolicy::default`] reproduces the
/// app's built-in values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Points awarded when a report is acknowledged.
    pub received_points: u32,
    /// Extra points when a report reaches `Action Taken`.
    pub resolution_bonus: u32,
    /// Rank of a reporter with zero points.
    pub base_rank: u64,
    /// Points needed to climb one rank.
    pub points_per_rank: u64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            received_points: 20,
            resolution_bonus: 10,
            base_rank: 150,
            points_per_rank: 30,
        }
    }
}

/// Error returned by [`ScoringPolicy::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPolicyError {
    /// `points_per_rank` must be positive.
    #[error("points_per_rank must be greater than zero")]
    ZeroPointsPerRank,

    /// `base_rank` must be at least 1.
    #[error("base_rank must be at least 1")]
    ZeroBaseRank,
}

impl ScoringPolicy {
    /// Checks that the policy can compute a rank.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPolicyError`] if `points_per_rank` or `base_rank`
    /// is zero.
    pub const fn validate(&self) -> Result<(), InvalidPolicyError> {
        if self.points_per_rank == 0 {
            return Err(InvalidPolicyError::ZeroPointsPerRank);
        }
        if self.base_rank == 0 {
            return Err(InvalidPolicyError::ZeroBaseRank);
        }
        Ok(())
    }

    /// Rank for a point total: `max(1, base_rank - floor(points / points_per_rank))`.
    #[must_use]
    pub fn rank_for(&self, points: u64) -> u64 {
        let climbed = points.checked_div(self.points_per_rank).unwrap_or(0);
        self.base_rank.saturating_sub(climbed).max(1)
    }

    /// Computes the profile for a history.
    #[must_use]
    pub fn profile_for(&self, history: &[Report]) -> UserProfile {
        let points = history.iter().map(|r| u64::from(r.points_awarded)).sum();
        UserProfile {
            points,
            rank: self.rank_for(points),
        }
    }
}

/// Derived reporter standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Sum of points over the history.
    pub points: u64,
    /// Leaderboard position; lower is better.
    pub rank: u64,
}

impl UserProfile {
    /// Profile of a reporter with an empty history.
    #[must_use]
    pub const fn empty(policy: &ScoringPolicy) -> Self {
        Self {
            points: 0,
            rank: policy.base_rank,
        }
    }
}
