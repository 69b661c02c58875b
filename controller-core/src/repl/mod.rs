//! REPL tooling shared between firmware and emulator targets.
//!
//! The REPL grammar lives in [`grammar`] and is implemented with a
//! token/parse pipeline that stays compatible with `no_std`. [`commands`]
//! dispatches parsed commands into the controller and renders the replies.

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
