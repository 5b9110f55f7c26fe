pub mod agent;
pub mod policy;
