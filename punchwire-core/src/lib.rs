//! # punchwire-core
//!
//! Core protocol implementation for Anviz and Soyal attendance terminals.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding for both families
//! - Checksum calculation (CRC-16 and XOR+sum)
//! - Opcode tables and status codes
//! - Fixed-width field packing
//! - Segmented template transfer planning

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod fields;
pub mod packet;
pub mod segment;

pub use command::{AnvizCommand, ReplyKind, Shape, SoyalCommand};
pub use error::{Error, ErrorKind, Result};
pub use packet::{preview, FrameSizer, ANVIZ_FRAME, SOYAL_FRAME};
