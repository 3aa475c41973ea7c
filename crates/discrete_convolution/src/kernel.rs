// Convolution kernels: a flat, row-major grid of coefficients plus the
// validated geometry every strategy works from.

use ndarray::{Array2, array};

use crate::error::{ConvolutionError, Result};

/// A 2D convolution kernel.
///
/// The coefficient at row `ky`, column `kx` is stored at `ky * width + kx`.
/// Nothing is checked on construction through the public fields; every
/// strategy calls [`Kernel::validate`] before touching a pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    pub width: usize,
    pub height: usize,
    pub coefficients: Vec<f64>,
}

/// A kernel that passed validation, together with its half extents.
///
/// The centre tap sits at `(half_height, half_width)`, which for even sizes
/// leaves one more tap below/right of the centre than above/left of it.
#[derive(Debug, Clone, Copy)]
pub struct KernelGeometry<'a> {
    coefficients: &'a [f64],
    pub width: usize,
    pub height: usize,
    pub half_width: usize,
    pub half_height: usize,
}

impl KernelGeometry<'_> {
    #[inline]
    pub fn coefficient(&self, ky: usize, kx: usize) -> f64 {
        self.coefficients[ky * self.width + kx]
    }
}

impl Kernel {
    /// Builds a kernel and checks it right away.
    pub fn new(width: usize, height: usize, coefficients: Vec<f64>) -> Result<Self> {
        let kernel = Self {
            width,
            height,
            coefficients,
        };
        kernel.validate()?;
        Ok(kernel)
    }

    /// Checks the coefficient count and derives the half extents.
    pub fn validate(&self) -> Result<KernelGeometry<'_>> {
        let expected = self.width.checked_mul(self.height);

        if self.width == 0 || self.height == 0 || expected != Some(self.coefficients.len()) {
            return Err(ConvolutionError::InvalidKernel {
                width: self.width,
                height: self.height,
                len: self.coefficients.len(),
            });
        }

        Ok(KernelGeometry {
            coefficients: &self.coefficients,
            width: self.width,
            height: self.height,
            half_width: self.width / 2,
            half_height: self.height / 2,
        })
    }

    /// Uniform averaging over a `size` x `size` window.
    pub fn box_blur(size: usize) -> Self {
        let taps = size * size;
        Self {
            width: size,
            height: size,
            coefficients: vec![1.0 / taps as f64; taps],
        }
    }

    /// The 1x1 kernel that leaves an image unchanged.
    pub fn identity() -> Self {
        Self {
            width: 1,
            height: 1,
            coefficients: vec![1.0],
        }
    }

    pub fn sharpen() -> Self {
        array![
            [0.0, -1.0, 0.0], //
            [-1.0, 5.0, -1.0], //
            [0.0, -1.0, 0.0], //
        ]
        .into()
    }

    pub fn sobel_x() -> Self {
        array![
            [-1.0, 0.0, 1.0], //
            [-2.0, 0.0, 2.0], //
            [-1.0, 0.0, 1.0], //
        ]
        .into()
    }

    pub fn sobel_y() -> Self {
        array![
            [-1.0, -2.0, -1.0], //
            [0.0, 0.0, 0.0],    //
            [1.0, 2.0, 1.0],    //
        ]
        .into()
    }

    /// Normalized Gaussian of the given size and standard deviation.
    pub fn gaussian(size: usize, sigma: f64) -> Self {
        let center = (size / 2) as f64;

        let mut weights = Array2::from_shape_fn((size, size), |(i, j)| {
            let y = i as f64 - center;
            let x = j as f64 - center;
            (-(x * x + y * y) / (2.0 * sigma * sigma)).exp()
        });

        let sum = weights.sum();
        if sum > 0.0 {
            weights.mapv_inplace(|w| w / sum);
        }

        weights.into()
    }
}

/// The 3x3 uniform averaging kernel.
impl Default for Kernel {
    fn default() -> Self {
        Self::box_blur(3)
    }
}

impl From<Array2<f64>> for Kernel {
    fn from(weights: Array2<f64>) -> Self {
        let (height, width) = weights.dim();
        Self {
            width,
            height,
            // logical (row major) order regardless of the array's memory layout
            coefficients: weights.iter().copied().collect(),
        }
    }
}
