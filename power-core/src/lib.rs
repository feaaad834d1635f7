#![no_std]

// Shared logic for USB suspend/resume power coordination.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware is reached only through the traits declared
// here, so the same state machines run under embassy on target and inside the
// host emulator and tests.

pub mod activity;
pub mod control;
pub mod fault;
pub mod link;
pub mod report;
pub mod startup;
pub mod telemetry;
pub mod transition;
