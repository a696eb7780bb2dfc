pub mod config;
pub mod whoami;
