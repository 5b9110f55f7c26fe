//! Auto-stop policy: tag parameters, typed per-VM policy, and the decision engine

pub mod config;
pub mod evaluator;
pub mod tags;

pub use config::{PolicyDefaults, VmPolicy};
pub use evaluator::PolicyEvaluator;
pub use tags::{
    collect_params, is_opted_in, merge_params, parse_params, TagParams, DEFAULT_PARAMETER_TAG,
    DEFAULT_WARNING_TAG,
};
