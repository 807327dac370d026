//! Chunking plan for an upload, derived from the size the client declares
//! and the upload speed it measured.
//!
//! Planning is a pure function of its inputs; the caller owns the upload id
//! and wherever the plan is cached.

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Chunk size used below the speed threshold.
    pub base_chunk_size: u64,
    /// Declared speed (Mbps) at or above which chunks grow.
    pub speed_threshold_mbps: f32,
    /// Growth factor applied to the base chunk at or above the threshold.
    pub chunk_multiplier: u64,
    /// Chunks per parallel connection.
    pub conn_density: u64,
    pub max_parallel_conns: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_chunk_size: 8 * MIB,
            speed_threshold_mbps: 12.0,
            chunk_multiplier: 2,
            conn_density: 3,
            max_parallel_conns: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanShape {
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub parallel_conns: u64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("declared file size must be greater than zero")]
    EmptyFile,
    #[error("declared upload speed must be a finite, non-negative number")]
    InvalidSpeed,
}

impl PlannerConfig {
    pub fn plan(&self, up_speed_mbps: f32, total_size: u64) -> Result<PlanShape, PlanError> {
        if total_size == 0 {
            return Err(PlanError::EmptyFile);
        }
        if !up_speed_mbps.is_finite() || up_speed_mbps < 0.0 {
            return Err(PlanError::InvalidSpeed);
        }

        let tier = if up_speed_mbps >= self.speed_threshold_mbps {
            self.base_chunk_size.saturating_mul(self.chunk_multiplier)
        } else {
            self.base_chunk_size
        };
        let chunk_size = tier.clamp(1, total_size);
        let total_chunks = total_size.div_ceil(chunk_size);
        let parallel_conns =
            (total_chunks / self.conn_density.max(1)).clamp(1, self.max_parallel_conns.max(1));

        Ok(PlanShape {
            chunk_size,
            total_chunks,
            parallel_conns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_above_threshold_case() {
        let shape = PlannerConfig::default().plan(15.0, 50_000_000).unwrap();
        assert_eq!(shape.chunk_size, 16 * MIB);
        assert_eq!(shape.total_chunks, 3);
        assert_eq!(shape.parallel_conns, 1);
    }

    #[test]
    fn test_plan_is_pure() {
        let config = PlannerConfig::default();
        let a = config.plan(10.0, 20 * MIB).unwrap();
        let b = config.plan(10.0, 20 * MIB).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.chunk_size, 8 * MIB);
        assert_eq!(a.total_chunks, 3);
    }

    #[test]
    fn test_chunk_capped_to_file_size() {
        let shape = PlannerConfig::default().plan(100.0, 1_000).unwrap();
        assert_eq!(shape.chunk_size, 1_000);
        assert_eq!(shape.total_chunks, 1);
        assert_eq!(shape.parallel_conns, 1);
    }

    #[test]
    fn test_connections_capped() {
        let shape = PlannerConfig::default().plan(5.0, 1024 * MIB).unwrap();
        assert_eq!(shape.total_chunks, 128);
        assert_eq!(shape.parallel_conns, 6);

        let shape = PlannerConfig::default().plan(5.0, 100 * MIB).unwrap();
        assert_eq!(shape.total_chunks, 13);
        assert_eq!(shape.parallel_conns, 4);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let config = PlannerConfig::default();
        assert_eq!(config.plan(10.0, 0), Err(PlanError::EmptyFile));
        assert_eq!(config.plan(f32::NAN, 10), Err(PlanError::InvalidSpeed));
        assert_eq!(config.plan(-1.0, 10), Err(PlanError::InvalidSpeed));
    }
}
