//! Compute backend selection
//!
//! `cuda` builds run on the GPU; everything else runs on NdArray. Serving
//! and evaluation use [`InferenceBackend`], training wraps it in autodiff.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type InferenceBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray"), not(feature = "cpu")))]
compile_error!("Enable the `ndarray` or `cuda` feature to select a backend");

pub type TrainingBackend = Autodiff<InferenceBackend>;

pub type Device = <InferenceBackend as Backend>::Device;

pub fn default_device() -> Device {
    Device::default()
}

/// Label shown in CLI output and logs
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_backend_shares_device() {
        let device: <TrainingBackend as Backend>::Device = default_device();
        assert_eq!(device, default_device());
        assert!(!backend_name().is_empty());
    }
}
