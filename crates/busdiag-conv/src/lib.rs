//! busdiag-conv - DID table and payload decoders
//!
//! Maps 16-bit data identifiers to a display name and one of two decoder
//! kinds. The table is an owned value: load it, hand it to whoever decodes,
//! and swap it for a new one to reload.
//!
//! # Quick Start
//!
//! ```rust
//! use busdiag_conv::{DidDecoder, DidTable};
//!
//! let mut table = DidTable::builtin();
//! table.register(0xF40D, "Vehicle Speed", DidDecoder::uint(1).unwrap());
//!
//! let value = table.decode(0xF190, b"1HGCM82633A123456");
//! assert_eq!(value.name, "VIN");
//! assert_eq!(value.value, "1HGCM82633A123456");
//!
//! // Unknown DIDs fall back to raw hex
//! let value = table.decode(0x1234, &[0xDE, 0xAD]);
//! assert_eq!(value.name, "0x1234");
//! assert_eq!(value.value, "DE AD");
//! ```
//!
//! # Definition files
//!
//! JSON, YAML or TOML, chosen by file extension:
//!
//! ```json
//! {
//!   "F190": { "name": "VIN", "decoder": "ascii" },
//!   "F1A0": { "name": "Odometer", "decoder": "uint", "byte_count": 4 }
//! }
//! ```

pub mod decoder;
pub mod error;
pub mod table;

pub use decoder::{decode_ascii, decode_uint, raw_hex, DidDecoder};
pub use error::{format_did, parse_did, ConvError, ConvResult};
pub use table::{DidEntry, DidTable, DidReading};
