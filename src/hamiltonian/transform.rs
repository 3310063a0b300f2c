use ndarray::prelude::*;

/// Transform a one-electron operator into the basis spanned by the columns of `c`.
pub fn transform_one(h: ArrayView2<f64>, c: ArrayView2<f64>) -> Array2<f64> {
    c.t().dot(&h).dot(&c)
}

/// Transform the two-electron integrals (pq|rs) into the basis spanned by the columns of `c`.
/// The transformation is done in two half steps over pairs of indices.
pub fn transform_eri(eri: ArrayView4<f64>, c: ArrayView2<f64>) -> Array4<f64> {
    let (n, m): (usize, usize) = c.dim();
    // (pq|rs) -> (pq|kl)
    let mut half: Array4<f64> = Array4::zeros([n, n, m, m]);
    for p in 0..n {
        for q in 0..n {
            let block: Array2<f64> = c.t().dot(&eri.slice(s![p, q, .., ..])).dot(&c);
            half.slice_mut(s![p, q, .., ..]).assign(&block);
        }
    }
    // (pq|kl) -> (ij|kl)
    let mut full: Array4<f64> = Array4::zeros([m, m, m, m]);
    for k in 0..m {
        for l in 0..m {
            let block: Array2<f64> = c.t().dot(&half.slice(s![.., .., k, l])).dot(&c);
            full.slice_mut(s![.., .., k, l]).assign(&block);
        }
    }
    full
}

/// Two-electron part of the closed-shell Fock matrix
/// G[D]_pq = sum_rs D_rs [(pq|rs) - 1/2 (pr|sq)] for a spin-summed density D.
pub fn two_electron_potential(eri: ArrayView4<f64>, d: ArrayView2<f64>) -> Array2<f64> {
    let n: usize = d.nrows();
    let mut g: Array2<f64> = Array2::zeros((n, n));
    for p in 0..n {
        for q in 0..n {
            let coulomb: f64 = (&eri.slice(s![p, q, .., ..]) * &d).sum();
            let exchange: f64 = (&eri.slice(s![p, .., .., q]) * &d).sum();
            g[[p, q]] = coulomb - 0.5 * exchange;
        }
    }
    g
}

/// Largest deviation of a matrix from its transpose.
pub fn asymmetry(a: ArrayView2<f64>) -> f64 {
    let n: usize = a.nrows();
    let mut dev: f64 = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            dev = dev.max((a[[i, j]] - a[[j, i]]).abs());
        }
    }
    dev
}

/// Largest violation of the 8-fold permutational symmetry of real (pq|rs) integrals.
pub fn eri_asymmetry(eri: ArrayView4<f64>) -> f64 {
    let n: usize = eri.shape()[0];
    let mut dev: f64 = 0.0;
    for p in 0..n {
        for q in 0..n {
            for r in 0..n {
                for s in 0..n {
                    let v: f64 = eri[[p, q, r, s]];
                    dev = dev
                        .max((v - eri[[q, p, r, s]]).abs())
                        .max((v - eri[[p, q, s, r]]).abs())
                        .max((v - eri[[r, s, p, q]]).abs());
                }
            }
        }
    }
    dev
}

/// Closed-shell mean-field energy E = sum_pq D_pq (h_pq + 1/2 G[D]_pq) of a spin-summed density.
pub fn mean_field_energy(h: ArrayView2<f64>, eri: ArrayView4<f64>, d: ArrayView2<f64>) -> f64 {
    let g: Array2<f64> = two_electron_potential(eri, d);
    (&d * &(&h + &(0.5 * &g))).sum()
}
