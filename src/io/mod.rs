mod imprint;
mod input;
pub(crate) mod settings;

pub use imprint::write_header;
pub use input::{read_config, read_input};
pub use settings::{
    BathConfig, BathKind, Configuration, ConvergenceConfig, FragmentationConfig,
    FragmentationKind, MatchingConfig, PolicyKind, RuleKind, SolverConfig, SolverName,
};
