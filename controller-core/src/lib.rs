#![no_std]

// Shared logic for the laser driver controller.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. The pulse-train engine, register bank, and REPL live
// here so the firmware and the emulator drive identical behavior.

pub mod channels;
pub mod control;
pub mod device;
pub mod engine;
pub mod laser;
pub mod registers;
pub mod repl;
pub mod telemetry;
pub mod timing;
