//! busdiag-core - frame model and adapter line codecs
//!
//! Value types for bus frames plus the stateless encode/decode functions
//! for every supported adapter dialect. Nothing in here performs I/O.
//!
//! # Dialects
//!
//! | Dialect | Adapter | Receive grammar |
//! |---------|---------|-----------------|
//! | [`Dialect::Slcan`] | Lawicel/SLCAN USB adapters | `t7E8203500300\r`, `T18DAF1108...\r` |
//! | [`Dialect::Mcp2515`] | microcontroller + MCP2515 sketch | `ID:7E8,LEN:2,DATA:50,03` / `7E8#50.03` / `7E8 2 50 03` |
//! | [`Dialect::Lin`] | LIN bridge | `PID:C1,DATA:00,FE,CKS:3F` / `LIN C1 00 FE 3F` |
//! | [`Dialect::Csv`] | generic logger | `12:00:01.250,7E8,5003,RX` |
//!
//! ```rust
//! use busdiag_core::{CanId, Dialect, LineCodec};
//!
//! let codec = LineCodec::new(Dialect::Slcan);
//! let id = CanId::standard(0x7E0).unwrap();
//! let line = codec.encode_frame(id, &[0x10, 0x03]).unwrap();
//! assert_eq!(line, b"t7E021003\r".to_vec());
//!
//! let frame = codec.decode_line("t7E021003").unwrap();
//! assert_eq!(frame.data(), &[0x10, 0x03]);
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod lin;

pub use codec::{BusFrame, CanBitrate, Dialect, LineCodec, SlcanCommand, TxCommand};
pub use error::{DecodeError, FrameError};
pub use frame::{BusKind, CanId, Direction, Frame, LinFrame, ProtectedId, MAX_CLASSIC_PAYLOAD};
pub use lin::{calculate_checksum, calculate_pid, ChecksumModel};
