pub mod application;
pub mod domain;
pub mod error;
pub mod gateways;
pub mod infrastructure;
pub mod interfaces;
