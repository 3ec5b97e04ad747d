pub mod error;
pub mod fixture;
pub mod meta;
pub mod provider;
pub mod types;
