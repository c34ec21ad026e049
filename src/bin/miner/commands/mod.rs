//! CLI subcommands

pub mod balance;
pub mod claim;
pub mod history;
pub mod start;
pub mod status;
pub mod track;
