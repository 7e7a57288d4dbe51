//! This module contains the rate control loop. Stages, in the order a cycle runs them:
//! `setpoint` (acceleration limiting and self-leveling), then `pid` (the P, I and D terms),
//! with D and yaw P run through the `filters` bank. `pid_init` turns a profile into the gains
//! the loop uses.
//!
//! [Betaflight Signal flow diagram](https://github.com/betaflight/betaflight/wiki/Signal-Flow-Diagram)
//! Note that this is just an example, and isn't necesssarily something to emulate.

pub mod common;
pub mod filters;
pub mod pid;
pub mod pid_init;
pub mod setpoint;
