pub mod config;
pub mod edit;
pub mod inspect;
pub mod resolve;
