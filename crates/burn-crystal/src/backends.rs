//! Backend support for burn-crystal
//!
//! Enable the desired backend via feature flags:
//!
//! - `ndarray`: CPU backend using ndarray (default)
//! - `tch`: PyTorch backend via libtorch
//! - `wgpu`: WebGPU backend (cross-platform GPU support)
//! - `cuda`: Native CUDA backend (NVIDIA GPUs only)
//!
//! Guided sampling differentiates the property head, so models are usually
//! built on [`DefaultAutodiffBackend`].
//!
//! # Example
//!
//! ```ignore
//! use burn_crystal::backends::{default_device, DefaultAutodiffBackend};
//! use burn_crystal::{CrystalDiffusion, DiffusionConfig};
//!
//! let device = default_device();
//! let model = CrystalDiffusion::<DefaultAutodiffBackend>::new(DiffusionConfig::default(), &device)?;
//! ```

pub use burn::backend::Autodiff;

#[cfg(feature = "ndarray")]
pub use burn::backend::{ndarray::NdArrayDevice, NdArray};

#[cfg(feature = "tch")]
pub use burn::backend::{libtorch::LibTorchDevice, LibTorch};

#[cfg(feature = "wgpu")]
pub use burn::backend::{wgpu::WgpuDevice, Wgpu};

#[cfg(feature = "cuda")]
pub use burn::backend::{cuda::CudaDevice, Cuda};

/// Type alias for the default backend when using ndarray feature
#[cfg(feature = "ndarray")]
pub type DefaultBackend = NdArray;

/// Type alias for the default backend when using tch feature
#[cfg(all(feature = "tch", not(feature = "ndarray")))]
pub type DefaultBackend = LibTorch;

/// Type alias for the default backend when using wgpu feature
#[cfg(all(feature = "wgpu", not(any(feature = "ndarray", feature = "tch"))))]
pub type DefaultBackend = Wgpu;

/// Type alias for the default backend when using cuda feature
#[cfg(all(
    feature = "cuda",
    not(any(feature = "ndarray", feature = "tch", feature = "wgpu"))
))]
pub type DefaultBackend = Cuda;

/// The default backend with gradient tracking, for guided sampling
#[cfg(any(feature = "ndarray", feature = "tch", feature = "wgpu", feature = "cuda"))]
pub type DefaultAutodiffBackend = Autodiff<DefaultBackend>;

/// Get the default device for the enabled backend
#[cfg(feature = "ndarray")]
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(feature = "tch", not(feature = "ndarray")))]
pub fn default_device() -> LibTorchDevice {
    LibTorchDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(feature = "wgpu", not(any(feature = "ndarray", feature = "tch"))))]
pub fn default_device() -> WgpuDevice {
    WgpuDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(
    feature = "cuda",
    not(any(feature = "ndarray", feature = "tch", feature = "wgpu"))
))]
pub fn default_device() -> CudaDevice {
    CudaDevice::default()
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use crate::{CrystalDiffusion, DiffusionConfig};

    #[test]
    fn test_default_backend_builds_model() {
        let device = default_device();
        let config = DiffusionConfig::default().with_timesteps(5).with_time_dim(8);
        let model = CrystalDiffusion::<DefaultAutodiffBackend>::new(config, &device).unwrap();
        assert_eq!(model.config().timesteps, 5);
    }
}
