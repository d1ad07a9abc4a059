//! Spatial padding (zero or reflection) and its adjoint.

use ndarray::Array4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PadMode {
    Zero,
    /// Mirror without repeating the edge pixel (`dcb|abcd|cba`)
    Reflect,
}

#[derive(Clone, Copy, Debug)]
pub struct Pad2d {
    pub pad: usize,
    pub mode: PadMode,
}

impl Pad2d {
    pub fn zero(pad: usize) -> Self {
        Self {
            pad,
            mode: PadMode::Zero,
        }
    }

    pub fn reflect(pad: usize) -> Self {
        Self {
            pad,
            mode: PadMode::Reflect,
        }
    }

    /// Index into the unpadded axis for padded coordinate `i`, if any.
    fn source(&self, i: usize, len: usize) -> Option<usize> {
        let j = i as isize - self.pad as isize;
        let n = len as isize;
        if (0..n).contains(&j) {
            return Some(j as usize);
        }
        match self.mode {
            PadMode::Zero => None,
            PadMode::Reflect => {
                let r = if j < 0 { -j } else { 2 * (n - 1) - j };
                debug_assert!((0..n).contains(&r), "reflection pad larger than input");
                Some(r as usize)
            }
        }
    }

    pub fn forward(&self, x: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = x.dim();
        if self.mode == PadMode::Reflect {
            assert!(
                self.pad < h && self.pad < w,
                "reflection pad {} needs input larger than {h}x{w}",
                self.pad
            );
        }
        let (ph, pw) = (h + 2 * self.pad, w + 2 * self.pad);
        let rows: Vec<Option<usize>> = (0..ph).map(|i| self.source(i, h)).collect();
        let cols: Vec<Option<usize>> = (0..pw).map(|i| self.source(i, w)).collect();

        let mut y = Array4::zeros((n, c, ph, pw));
        for ni in 0..n {
            for ci in 0..c {
                for (py, sy) in rows.iter().enumerate() {
                    let Some(sy) = *sy else { continue };
                    for (px, sx) in cols.iter().enumerate() {
                        if let Some(sx) = *sx {
                            y[[ni, ci, py, px]] = x[[ni, ci, sy, sx]];
                        }
                    }
                }
            }
        }
        y
    }

    /// Fold the padded gradient back onto the input grid.
    pub fn backward(&self, input_dim: (usize, usize, usize, usize), grad_out: &Array4<f32>) -> Array4<f32> {
        let (n, c, h, w) = input_dim;
        let (_, _, ph, pw) = grad_out.dim();
        let rows: Vec<Option<usize>> = (0..ph).map(|i| self.source(i, h)).collect();
        let cols: Vec<Option<usize>> = (0..pw).map(|i| self.source(i, w)).collect();

        let mut g = Array4::zeros((n, c, h, w));
        for ni in 0..n {
            for ci in 0..c {
                for (py, sy) in rows.iter().enumerate() {
                    let Some(sy) = *sy else { continue };
                    for (px, sx) in cols.iter().enumerate() {
                        if let Some(sx) = *sx {
                            g[[ni, ci, sy, sx]] += grad_out[[ni, ci, py, px]];
                        }
                    }
                }
            }
        }
        g
    }
}
