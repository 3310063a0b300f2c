use crate::defaults;
use crate::matching::mixer::Mixer;
use log::debug;
use ndarray::prelude::*;

/// Quasi-Newton update inside a trust region. The step proposed by the inner mixer is
/// scaled down to the trust radius if it is longer. The radius grows after an iteration
/// that reduced the residual norm and shrinks after one that increased it, bounded by
/// `[min_radius, max_radius]`.
pub struct TrustRegionMixer {
    inner: Box<dyn Mixer>,
    initial_radius: f64,
    radius: f64,
    min_radius: f64,
    max_radius: f64,
    last_norm: Option<f64>,
}

impl TrustRegionMixer {
    pub fn new(inner: Box<dyn Mixer>, radius: f64, max_radius: f64) -> Self {
        let max_radius: f64 = max_radius.max(radius);
        TrustRegionMixer {
            inner,
            initial_radius: radius,
            radius,
            min_radius: radius * defaults::TRUST_MIN_FACTOR,
            max_radius,
            last_norm: None,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn adapt(&mut self, norm: f64) {
        if let Some(last) = self.last_norm {
            self.radius = if norm < last {
                (self.radius * defaults::TRUST_EXPAND).min(self.max_radius)
            } else {
                (self.radius * defaults::TRUST_SHRINK).max(self.min_radius)
            };
        }
        self.last_norm = Some(norm);
    }
}

impl Mixer for TrustRegionMixer {
    fn name(&self) -> &str {
        "trust-region Broyden"
    }

    fn next(&mut self, x: Array1<f64>, r: Array1<f64>) -> Array1<f64> {
        self.adapt(r.dot(&r).sqrt());
        let proposed: Array1<f64> = self.inner.next(x.clone(), r);
        let step: Array1<f64> = &proposed - &x;
        let length: f64 = step.dot(&step).sqrt();
        if length <= self.radius {
            return proposed;
        }
        debug!(
            "step of length {:.3e} limited to the trust radius {:.3e}",
            length, self.radius
        );
        x + &(step * (self.radius / length))
    }

    fn reset(&mut self, n: usize) {
        self.inner.reset(n);
        self.radius = self.initial_radius;
        self.last_norm = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::mixer::LinearMixer;
    use approx::assert_abs_diff_eq;

    #[test]
    fn long_steps_are_cut_to_the_radius() {
        let mut mixer: TrustRegionMixer =
            TrustRegionMixer::new(Box::new(LinearMixer::new(1.0)), 0.1, 1.0);
        let x: Array1<f64> = mixer.next(array![0.0, 0.0], array![3.0, 4.0]);
        assert_abs_diff_eq!(x[0], 0.06, epsilon = 1e-14);
        assert_abs_diff_eq!(x[1], 0.08, epsilon = 1e-14);
        // short steps are taken unchanged
        let x: Array1<f64> = mixer.next(x, array![0.01, 0.0]);
        assert_abs_diff_eq!(x[0], 0.07, epsilon = 1e-14);
    }

    #[test]
    fn radius_follows_the_residual() {
        let mut mixer: TrustRegionMixer =
            TrustRegionMixer::new(Box::new(LinearMixer::new(0.1)), 0.2, 0.5);
        let x: Array1<f64> = mixer.next(array![0.0], array![1.0]);
        assert_eq!(mixer.radius(), 0.2);
        let x: Array1<f64> = mixer.next(x, array![0.5]);
        assert_abs_diff_eq!(mixer.radius(), 0.2 * defaults::TRUST_EXPAND, epsilon = 1e-14);
        let x: Array1<f64> = mixer.next(x, array![0.4]);
        assert_abs_diff_eq!(mixer.radius(), 0.5, epsilon = 1e-14);
        mixer.next(x, array![2.0]);
        assert_abs_diff_eq!(mixer.radius(), 0.5 * defaults::TRUST_SHRINK, epsilon = 1e-14);
        mixer.reset(1);
        assert_eq!(mixer.radius(), 0.2);
    }
}
