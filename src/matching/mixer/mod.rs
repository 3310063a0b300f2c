use crate::defaults;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

mod broyden;
mod secant;
mod trust_region;

pub use broyden::BroydenMixer;
pub use secant::SecantMixer;
pub use trust_region::TrustRegionMixer;

/// Update rule of the matching potentials. `next` receives the potentials x that produced the
/// residual r and returns the potentials of the next iteration. A vanishing residual is a
/// fixed point of every rule.
pub trait Mixer: Send {
    fn name(&self) -> &str;

    fn next(&mut self, x: Array1<f64>, r: Array1<f64>) -> Array1<f64>;

    /// Forget the history, the next call starts a new sequence of vectors of length n.
    fn reset(&mut self, n: usize);
}

/// Selection of the update rule in the configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum UpdateRule {
    Linear { step: f64 },
    Secant { step: f64, max_step: f64 },
    Broyden { alpha: f64, history: usize },
    /// Broyden steps limited to an adaptive trust radius
    TrustRegion {
        alpha: f64,
        history: usize,
        radius: f64,
        max_radius: f64,
    },
}

impl UpdateRule {
    pub fn secant() -> Self {
        UpdateRule::Secant {
            step: defaults::MATCHING_STEP,
            max_step: defaults::MAX_STEP,
        }
    }

    pub fn broyden() -> Self {
        UpdateRule::Broyden {
            alpha: defaults::BROYDEN_MIXING_PARAMETER,
            history: defaults::BROYDEN_HISTORY,
        }
    }

    pub fn trust_region() -> Self {
        UpdateRule::TrustRegion {
            alpha: defaults::BROYDEN_MIXING_PARAMETER,
            history: defaults::BROYDEN_HISTORY,
            radius: defaults::TRUST_RADIUS,
            max_radius: defaults::MAX_STEP,
        }
    }

    /// A fresh mixer for vectors of length n.
    pub fn build(&self, n: usize) -> Box<dyn Mixer> {
        match *self {
            UpdateRule::Linear { step } => Box::new(LinearMixer::new(step)),
            UpdateRule::Secant { step, max_step } => Box::new(SecantMixer::new(step, max_step)),
            UpdateRule::Broyden { alpha, history } => {
                Box::new(BroydenMixer::new(n, alpha, history))
            }
            UpdateRule::TrustRegion {
                alpha,
                history,
                radius,
                max_radius,
            } => Box::new(TrustRegionMixer::new(
                Box::new(BroydenMixer::new(n, alpha, history)),
                radius,
                max_radius,
            )),
        }
    }
}

/// x + step * r
#[derive(Debug, Clone)]
pub struct LinearMixer {
    step: f64,
}

impl LinearMixer {
    pub fn new(step: f64) -> Self {
        LinearMixer { step }
    }
}

impl Mixer for LinearMixer {
    fn name(&self) -> &str {
        "linear"
    }

    fn next(&mut self, x: Array1<f64>, r: Array1<f64>) -> Array1<f64> {
        x + &(r * self.step)
    }

    fn reset(&mut self, _n: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;

    // r(x) = b - A x, the fixed point solves the linear system
    fn residual(x: &Array1<f64>) -> Array1<f64> {
        let a: Array2<f64> = array![[2.0, 0.3, 0.0], [0.3, 1.5, 0.2], [0.0, 0.2, 1.0]];
        let b: Array1<f64> = array![1.0, -0.5, 0.25];
        b - a.dot(x)
    }

    fn iterate(mixer: &mut dyn Mixer, max_iter: usize) -> (Array1<f64>, usize) {
        let mut x: Array1<f64> = Array1::zeros(3);
        for it in 0..max_iter {
            let r: Array1<f64> = residual(&x);
            if r.dot(&r).sqrt() < 1e-10 {
                return (x, it);
            }
            x = mixer.next(x, r);
        }
        (x, max_iter)
    }

    #[test]
    fn vector_rules_find_the_fixed_point() {
        for rule in [
            UpdateRule::Linear { step: 0.4 },
            UpdateRule::broyden(),
            UpdateRule::trust_region(),
        ]
        .iter()
        {
            let mut mixer: Box<dyn Mixer> = rule.build(3);
            let (x, it) = iterate(mixer.as_mut(), 200);
            assert!(it < 200, "{} did not converge", mixer.name());
            assert!(residual(&x).abs_diff_eq(&Array1::zeros(3), 1e-9));
        }
    }

    #[test]
    fn broyden_beats_linear_mixing() {
        let mut linear: Box<dyn Mixer> = UpdateRule::Linear { step: 0.5 }.build(3);
        let mut broyden: Box<dyn Mixer> = UpdateRule::broyden().build(3);
        let (_, it_linear) = iterate(linear.as_mut(), 200);
        let (_, it_broyden) = iterate(broyden.as_mut(), 200);
        assert!(it_broyden < it_linear);
    }

    #[test]
    fn zero_residual_is_a_fixed_point() {
        let x: Array1<f64> = array![0.1, 0.2, 0.3];
        for rule in [
            UpdateRule::Linear { step: 0.4 },
            UpdateRule::secant(),
            UpdateRule::broyden(),
            UpdateRule::trust_region(),
        ]
        .iter()
        {
            let mut mixer: Box<dyn Mixer> = rule.build(3);
            assert_eq!(mixer.next(x.clone(), Array1::zeros(3)), x);
        }
    }
}
