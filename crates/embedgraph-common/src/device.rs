//! Device placement descriptors.
//!
//! A [`DeviceSpec`] is an opaque, equality-comparable placement value that
//! operators pick up from the active device scope when they are created.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Kind of device an operator can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Host CPU.
    Cpu,
    /// NVIDIA CUDA.
    Cuda,
    /// AMD `ROCm` / HIP.
    Hip,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::Hip => write!(f, "hip"),
        }
    }
}

/// A concrete placement: device kind plus ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub kind: DeviceKind,
    pub index: u32,
}

impl DeviceSpec {
    pub const fn new(kind: DeviceKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// The host CPU.
    pub const fn cpu() -> Self {
        Self::new(DeviceKind::Cpu, 0)
    }

    /// CUDA device with the given ordinal.
    pub const fn cuda(index: u32) -> Self {
        Self::new(DeviceKind::Cuda, index)
    }

    /// HIP device with the given ordinal.
    pub const fn hip(index: u32) -> Self {
        Self::new(DeviceKind::Hip, index)
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.index)
    }
}

impl FromStr for DeviceSpec {
    type Err = GraphError;

    /// Accepts `cpu`, `cuda`, `gpu`, `hip`, `rocm`, optionally followed by
    /// `:<index>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let (kind, index) = match lowered.split_once(':') {
            Some((kind, index)) => {
                let index = index.parse::<u32>().map_err(|e| {
                    GraphError::invalid_argument(format!("invalid device index in '{s}': {e}"))
                })?;
                (kind.to_string(), index)
            }
            None => (lowered, 0),
        };

        let kind = match kind.as_str() {
            "cpu" => DeviceKind::Cpu,
            "cuda" | "gpu" => DeviceKind::Cuda,
            "hip" | "rocm" => DeviceKind::Hip,
            other => {
                return Err(GraphError::invalid_argument(format!("unknown device kind: {other}")));
            }
        };
        Ok(DeviceSpec::new(kind, index))
    }
}
