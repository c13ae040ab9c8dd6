//! sdhc-core - SD/eMMC host transaction engine and mode negotiation
//!
//! This crate sits between a storage/filesystem client and a physical
//! SD/eMMC host controller. It executes abstract bus requests (commands,
//! optional data transfers) against a controller implementing the
//! [`host::HostController`] trait, and negotiates the bus operating point
//! (clock, width, voltage, timing, driver strength) from identification
//! speed up to the best mutually-supported high-speed mode. It is designed
//! to be `no_std` compatible for use in embedded environments.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation (boxed controller trait objects)
//!
//! # Example
//!
//! ```ignore
//! use sdhc_core::{bus::SdhcIo, command::{Command, ResponseType}, negotiate, transaction};
//!
//! fn bring_up<C: sdhc_core::host::HostController>(host: &mut C) {
//!     let ident = SdhcIo::ident();
//!     host.set_io(&ident).unwrap();
//!
//!     let plan = negotiate::candidate_plan(&host.host_props());
//!     let probe = Command::new(13, 0, ResponseType::R1);
//!     match negotiate::negotiate(host, &ident, &plan, &probe) {
//!         Ok(io) => println!("bus at {:?} @ {} Hz", io.timing, io.clock),
//!         Err(e) => println!("negotiation failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod command;
pub mod error;
pub mod host;
pub mod negotiate;
pub mod transaction;

pub use error::{Error, Result};
