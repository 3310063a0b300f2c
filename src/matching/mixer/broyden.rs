use crate::defaults;
use crate::matching::mixer::Mixer;
use crate::utils::inv;
use log::warn;
use ndarray::prelude::*;

/// Modified Broyden mixer
///
/// The algorithm is based on the implementation in the DFTB+ Code
/// see https://github.com/dftbplus/dftbplus/blob/master/prog/dftb%2B/lib_mixer/broydenmixer.F90
/// and J. Chem. Phys. 152, 124101 (2020); https://doi.org/10.1063/1.5143190
pub struct BroydenMixer {
    // current iteration
    iter: usize,
    // number of stored iterations before the history is dropped
    miter: usize,
    omega0: f64,
    // mixing parameter
    alpha: f64,
    // minimal weight allowed
    min_weight: f64,
    // maximal weight allowed
    max_weight: f64,
    // numerator of the weight
    weight_factor: f64,
    ww: Array1<f64>,
    // residual in last iteration
    r_last: Array1<f64>,
    // input potentials in last iteration
    x_last: Array1<f64>,
    // storage for A matrix
    a_mat: Array2<f64>,
    // df vectors
    df: Array2<f64>,
    // uu vectors
    uu: Array2<f64>,
}

impl BroydenMixer {
    pub fn new(n: usize, alpha: f64, history: usize) -> BroydenMixer {
        let miter: usize = history.max(2);
        BroydenMixer {
            iter: 0,
            miter,
            omega0: defaults::BROYDEN_OMEGA0,
            alpha,
            min_weight: defaults::BROYDEN_MIN_WEIGHT,
            max_weight: defaults::BROYDEN_MAX_WEIGHT,
            weight_factor: defaults::BROYDEN_WEIGHT_FACTOR,
            ww: Array1::zeros([miter - 1]),
            r_last: Array1::zeros([n]),
            x_last: Array1::zeros([n]),
            a_mat: Array2::zeros([miter - 1, miter - 1]),
            df: Array2::zeros([n, miter - 1]),
            uu: Array2::zeros([n, miter - 1]),
        }
    }

    /// Mixes the residual of the current iteration with the stored history
    fn mix(&mut self, x: Array1<f64>, r: Array1<f64>) -> Array1<f64> {
        // First iteration: simple mix and storage of x and r
        if self.iter == 0 {
            self.x_last = x.clone();
            self.r_last = r.clone();
            return x + &r.mapv(|v| v * self.alpha);
        }

        let nn_1: usize = self.iter - 1;
        // Create weight factor
        let mut ww_at_n1: f64 = r.dot(&r).sqrt();
        if ww_at_n1 > self.weight_factor / self.max_weight {
            ww_at_n1 = self.weight_factor / ww_at_n1;
        } else {
            ww_at_n1 = self.max_weight;
        }
        if ww_at_n1 < self.min_weight {
            ww_at_n1 = self.min_weight;
        }
        self.ww[nn_1] = ww_at_n1;

        // Build |DF(m-1)> (m is the current iteration number)
        let mut df_uu: Array1<f64> = &r - &self.r_last;
        let mut inv_norm: f64 = df_uu.dot(&df_uu).sqrt();
        inv_norm = if inv_norm > 1e-12 { inv_norm } else { 1e-12 };
        inv_norm = 1.0 / inv_norm;
        df_uu.mapv_inplace(|v| v * inv_norm);

        // Build a, beta, c, and gamma
        let mut cc: Array1<f64> = Array1::zeros([self.iter]);
        for i in 0..nn_1 {
            self.a_mat[[i, nn_1]] = self.df.column(i).dot(&df_uu);
            self.a_mat[[nn_1, i]] = self.a_mat[[i, nn_1]];
            cc[i] = self.df.column(i).dot(&r) * self.ww[i];
        }
        self.a_mat[[nn_1, nn_1]] = 1.0;
        cc[nn_1] = self.ww[nn_1] * df_uu.dot(&r);

        let mut beta: Array2<f64> = Array2::zeros([self.iter, self.iter]);
        for i in 0..self.iter {
            beta.slice_mut(s![.., i]).assign(
                &(&self.ww.slice(s![..self.iter]).mapv(|w| w * self.ww[i])
                    * &self.a_mat.slice(s![..self.iter, i])),
            );
            beta[[i, i]] += self.omega0.powi(2);
        }

        let beta: Array2<f64> = match inv(beta.view()) {
            Some(b) => b,
            None => {
                warn!("Broyden mixer: singular history matrix, falling back to simple mixing");
                self.reset(r.len());
                return self.mix(x, r);
            }
        };
        let gamma: Array1<f64> = cc.dot(&beta);
        // Store |dF(m-1)>
        self.df.column_mut(nn_1).assign(&df_uu);

        // Create |u(m-1)>
        df_uu = df_uu.mapv(|v| v * self.alpha) + (&x - &self.x_last).mapv(|v| v * inv_norm);

        // Save vectors before overwriting
        self.x_last = x.clone();
        self.r_last = r.clone();

        // Build new vector
        let mut x_new: Array1<f64> = r.mapv(|v| v * self.alpha) + &x;
        for i in 0..nn_1 {
            x_new.scaled_add(-self.ww[i] * gamma[i], &self.uu.column(i));
        }
        x_new.scaled_add(-self.ww[nn_1] * gamma[nn_1], &df_uu);

        // Save |u(m-1)>
        self.uu.column_mut(nn_1).assign(&df_uu);
        x_new
    }
}

impl Mixer for BroydenMixer {
    fn name(&self) -> &str {
        "Broyden"
    }

    fn next(&mut self, x: Array1<f64>, r: Array1<f64>) -> Array1<f64> {
        if self.iter >= self.miter {
            self.reset(r.len());
        }
        let x_new: Array1<f64> = self.mix(x, r);
        self.iter += 1;
        x_new
    }

    fn reset(&mut self, n: usize) {
        self.iter = 0;
        self.ww = Array1::zeros([self.miter - 1]);
        self.r_last = Array1::zeros([n]);
        self.x_last = Array1::zeros([n]);
        self.a_mat = Array2::zeros([self.miter - 1, self.miter - 1]);
        self.df = Array2::zeros([n, self.miter - 1]);
        self.uu = Array2::zeros([n, self.miter - 1]);
    }
}
