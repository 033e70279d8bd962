//! different utility modules used throughout the project
/// logger set-up (terminal and optional file) built on simplelog
pub mod logger;
/// explicit wall-clock timer for the phases of a solve
pub mod timer;
