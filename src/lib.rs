pub mod app;
pub mod cli;
pub mod clock;
pub mod controller;
pub mod errors;
pub mod models;
pub mod process;
pub mod spool;
