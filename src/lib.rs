//! Bootstrap embedding: a system is cut into overlapping fragments, every fragment is
//! embedded in a Schmidt bath of a mean-field reference and solved by a correlated solver,
//! and one-body potentials are adjusted until overlapping fragments agree on their shared
//! density.
pub mod bath;
pub mod defaults;
pub mod driver;
pub mod error;
pub mod fragmentation;
pub mod hamiltonian;
pub mod io;
pub mod matching;
pub mod solver;
pub mod system;
pub mod utils;

pub use driver::{
    BootstrapEmbedding, BootstrapResult, ConvergenceFailure, DriverState, ErrorPolicy,
    OneShotResult,
};
pub use error::BeError;
pub use io::Configuration;
pub use system::{IntegralProvider, LatticeModel, ModelSystem, System};
