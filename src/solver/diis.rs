use crate::utils::solve;
use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use std::collections::VecDeque;

/// Pulay's direct inversion in the iterative subspace for Fock matrices,
/// [Pulay:1980:393]. The error vectors are the commutators FD - DF.
pub struct Diis {
    space: usize,
    focks: VecDeque<Array2<f64>>,
    errors: VecDeque<Array2<f64>>,
}

impl Diis {
    pub fn new(space: usize) -> Self {
        Diis {
            space: space.max(2),
            focks: VecDeque::with_capacity(space),
            errors: VecDeque::with_capacity(space),
        }
    }

    pub fn push(&mut self, fock: Array2<f64>, error: Array2<f64>) {
        if self.focks.len() == self.space {
            self.focks.pop_front();
            self.errors.pop_front();
        }
        self.focks.push_back(fock);
        self.errors.push_back(error);
    }

    /// Extrapolated Fock matrix, None if the subspace is too small or the
    /// Pulay equations are singular.
    pub fn extrapolate(&self) -> Option<Array2<f64>> {
        let count: usize = self.focks.len();
        if count < 2 {
            return None;
        }
        // build error matrix B, [Pulay:1980:393], Eqn. 6, LHS
        let mut b: Array2<f64> = Array2::zeros((count + 1, count + 1));
        b.slice_mut(s![count, ..]).fill(-1.0);
        b.slice_mut(s![.., count]).fill(-1.0);
        b[[count, count]] = 0.0;
        for (i, e1) in self.errors.iter().enumerate() {
            for (j, e2) in self.errors.iter().enumerate().take(i + 1) {
                let val: f64 = (e1 * e2).sum();
                b[[i, j]] = val;
                b[[j, i]] = val;
            }
        }
        // normalize
        let max: f64 = *b
            .slice(s![..count, ..count])
            .mapv(f64::abs)
            .max()
            .ok()?;
        if max <= 0.0 {
            return None;
        }
        b.slice_mut(s![..count, ..count]).mapv_inplace(|x| x / max);

        // build residual vector, [Pulay:1980:393], Eqn. 6, RHS
        let mut resid: Array1<f64> = Array1::zeros(count + 1);
        resid[count] = -1.0;
        let ci: Array1<f64> = solve(b.view(), resid.view())?;

        let mut fock: Array2<f64> = Array2::zeros(self.focks[0].raw_dim());
        for (f, c) in self.focks.iter().zip(ci.iter()) {
            fock.scaled_add(*c, f);
        }
        Some(fock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;

    #[test]
    fn extrapolation_cancels_linear_error() {
        // errors +e and -e are removed by equal weights
        let mut diis: Diis = Diis::new(4);
        let e: Array2<f64> = array![[0.0, 1.0], [-1.0, 0.0]];
        diis.push(array![[1.0, 0.0], [0.0, 3.0]], e.clone());
        diis.push(array![[3.0, 0.0], [0.0, 1.0]], -&e);
        let fock: Array2<f64> = diis.extrapolate().unwrap();
        assert!(fock.abs_diff_eq(&array![[2.0, 0.0], [0.0, 2.0]], 1e-12));
    }

    #[test]
    fn single_vector_gives_nothing() {
        let mut diis: Diis = Diis::new(4);
        diis.push(Array2::eye(2), Array2::zeros((2, 2)));
        assert!(diis.extrapolate().is_none());
    }
}
