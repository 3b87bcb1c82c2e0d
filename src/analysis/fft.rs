// src/analysis/fft.rs
//! Packed stereo FFT.
//!
//! Both channels are real, so one complex transform does the work of two:
//! left goes in the real part, right in the imaginary part, and the two
//! spectra are pulled apart afterwards with [`split_bin`].

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// A forward FFT plan of fixed length plus its scratch space.
pub struct PackedFft {
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl PackedFft {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self { fft, scratch }
    }

    pub fn len(&self) -> usize {
        self.fft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fft.len() == 0
    }

    /// Transform `buffer` in place. `buffer.len()` must equal [`Self::len`].
    pub fn transform(&mut self, buffer: &mut [Complex<f32>]) {
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }
}

impl std::fmt::Debug for PackedFft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedFft").field("len", &self.len()).finish()
    }
}

/// Separate bin `k` of a packed transform into the two real inputs' bins.
///
/// `ck` is `Z[k]` and `cnk` is `Z[N-k]`. With `z = x + i*y`:
/// `X[k] = (Z[k] + conj(Z[N-k])) / 2` and `Y[k] = (Z[k] - conj(Z[N-k])) / 2i`.
pub fn split_bin(ck: Complex<f32>, cnk: Complex<f32>) -> (Complex<f32>, Complex<f32>) {
    let x = Complex::new((ck.re + cnk.re) / 2.0, (ck.im - cnk.im) / 2.0);
    let y = Complex::new((ck.im + cnk.im) / 2.0, (cnk.re - ck.re) / 2.0);
    (x, y)
}
