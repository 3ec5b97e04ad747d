pub mod contract;
pub mod creative;
pub mod naming;
pub mod rules;
