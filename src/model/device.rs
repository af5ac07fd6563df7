//! Device and precision selection

use candle_core::{DType, Device};
use tracing::{info, warn};

/// Where the model runs and at which precision
#[derive(Debug, Clone)]
pub struct Placement {
    /// Compute device
    pub device: Device,
    /// Weight and activation dtype
    pub dtype: DType,
}

impl Placement {
    /// General-purpose processor at full precision
    #[must_use]
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            dtype: DType::F32,
        }
    }

    /// Pick CUDA ordinal 0, then Metal, then CPU
    ///
    /// Accelerators get reduced precision (BF16 where supported, F16
    /// otherwise). A device that is reported available but fails to
    /// initialise is skipped.
    #[must_use]
    pub fn detect(force_cpu: bool) -> Self {
        if force_cpu {
            info!("CPU placement forced");
            return Self::cpu();
        }

        if candle_core::utils::cuda_is_available() {
            match Device::new_cuda(0) {
                Ok(device) => return Self::accelerated(device),
                Err(e) => warn!(error = %e, "CUDA initialisation failed"),
            }
        }
        if candle_core::utils::metal_is_available() {
            match Device::new_metal(0) {
                Ok(device) => return Self::accelerated(device),
                Err(e) => warn!(error = %e, "Metal initialisation failed"),
            }
        }

        info!("No accelerator available, using CPU");
        Self::cpu()
    }

    fn accelerated(device: Device) -> Self {
        let dtype = if device.is_cuda() && device.supports_bf16() {
            DType::BF16
        } else {
            DType::F16
        };
        Self { device, dtype }
    }

    /// Whether the placement is on an accelerator
    #[must_use]
    pub fn is_accelerated(&self) -> bool {
        !self.device.is_cpu()
    }

    /// Short label such as `cuda:bf16` or `cpu:f32`
    #[must_use]
    pub fn label(&self) -> String {
        let kind = if self.device.is_cuda() {
            "cuda"
        } else if self.device.is_metal() {
            "metal"
        } else {
            "cpu"
        };
        format!("{kind}:{}", self.dtype.as_str())
    }
}
