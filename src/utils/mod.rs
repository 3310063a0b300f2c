mod linalg;

pub use linalg::{eigh, inv, inv_sqrt, max_abs_deviation, solve, LinalgError};
use std::fmt;
use std::time::Instant;

/// Wall-clock timer of a named stage. It is displayed in the column layout of the energy
/// report of the driver.
pub struct Timer {
    label: &'static str,
    time: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        Timer {
            label,
            time: Instant::now(),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.time.elapsed().as_secs_f64()
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:<26} {:>24.2} s", self.label, self.seconds())
    }
}
