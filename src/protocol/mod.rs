//! # Directolor Protocol Module
//!
//! Implementation of the Directolor blind remote protocol.
//!
//! This module handles:
//! - Command, group, duplicate and store-favorite frame encoding
//! - CRC-16 (poly 0x755B) checksum calculation
//! - 32-byte frame finalization with preamble
//! - Decoding of frames captured from physical remotes

pub mod types;
pub mod encoder;
pub mod decoder;
pub mod frame;
pub mod crc;
