#![no_std]

// Shared logic for the storage enclosure controller feature set.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing abstractions the other crates can adopt.

pub mod config;
pub mod hotplug;
pub mod power;
pub mod presence;
pub mod protocol;
pub mod rails;
