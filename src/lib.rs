//! # Directolor Library
//!
//! Drive Directolor motorized blinds by impersonating their 2.4 GHz remotes.
//!
//! This library provides the wire protocol encoder and decoder, the command
//! scheduler that paces and repeats transmissions over an nRF24-class
//! transceiver, and a learner that recovers the identity of a physical remote
//! from over-the-air traffic.

pub mod config;
pub mod console;
pub mod error;
pub mod learner;
pub mod protocol;
pub mod radio;
pub mod scheduler;
pub mod telemetry;
