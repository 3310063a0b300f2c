use crate::matching::mixer::Mixer;
use ndarray::prelude::*;

// differences below this value are treated as a vanishing secant
const SECANT_EPS: f64 = 1.0e-12;

/// Secant (regula falsi without bracketing) update of every component on its own. The first
/// step, vanishing differences and secants that point uphill use the linear step instead,
/// every step is capped at `max_step`.
pub struct SecantMixer {
    step: f64,
    max_step: f64,
    last: Option<(Array1<f64>, Array1<f64>)>,
}

impl SecantMixer {
    pub fn new(step: f64, max_step: f64) -> Self {
        SecantMixer {
            step,
            max_step,
            last: None,
        }
    }

    fn delta(&self, i: usize, x: f64, r: f64) -> f64 {
        let linear: f64 = self.step * r;
        let (x_last, r_last) = match self.last.as_ref() {
            Some((xl, rl)) if xl.len() > i => (xl[i], rl[i]),
            _ => return linear,
        };
        let dx: f64 = x - x_last;
        let dr: f64 = r - r_last;
        if dx.abs() < SECANT_EPS || dr.abs() < SECANT_EPS {
            return linear;
        }
        let delta: f64 = -r * dx / dr;
        // the residual has to decrease along x + step * r
        if delta * r < 0.0 {
            linear
        } else {
            delta
        }
    }
}

impl Mixer for SecantMixer {
    fn name(&self) -> &str {
        "secant"
    }

    fn next(&mut self, x: Array1<f64>, r: Array1<f64>) -> Array1<f64> {
        let x_new: Array1<f64> = x
            .iter()
            .zip(r.iter())
            .enumerate()
            .map(|(i, (&xi, &ri))| {
                let d: f64 = self.delta(i, xi, ri);
                xi + d.max(-self.max_step).min(self.max_step)
            })
            .collect();
        self.last = Some((x, r));
        x_new
    }

    fn reset(&mut self, _n: usize) {
        self.last = None;
    }
}
