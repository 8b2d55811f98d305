pub mod command;
pub mod config;
pub mod stage;
pub mod terminal;
