//! DID lookup table

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decoder::{raw_hex, DidDecoder};
use crate::error::{format_did, parse_did, ConvError, ConvResult};

/// One known DID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DidEntry {
    pub name: String,
    #[serde(flatten)]
    pub decoder: DidDecoder,
}

/// Result of decoding a DID payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DidReading {
    pub did: u16,
    pub name: String,
    pub value: String,
    /// False when the DID was not in the table and `value` is raw hex
    pub known: bool,
}

/// On-disk entry shape
#[derive(Debug, Deserialize)]
struct DidEntryDef {
    name: String,
    #[serde(default = "default_decoder")]
    decoder: String,
    #[serde(default = "default_byte_count")]
    byte_count: usize,
}

fn default_decoder() -> String {
    "ascii".to_string()
}

fn default_byte_count() -> usize {
    4
}

/// Map of DID to name and decoder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DidTable {
    entries: BTreeMap<u16, DidEntry>,
}

impl DidTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard identifiers from ISO 14229 Annex C
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(0xF190, "VIN", DidDecoder::Ascii);
        table.register(0xF124, "ECU Serial Number", DidDecoder::Ascii);
        table.register(0xF1A0, "Odometer", DidDecoder::Uint { byte_count: 4 });
        table.register(0xF187, "Spare Part Number", DidDecoder::Ascii);
        table.register(0xF189, "Software Version", DidDecoder::Ascii);
        table.register(0xF18A, "System Supplier", DidDecoder::Ascii);
        table.register(0xF18B, "Manufacturing Date", DidDecoder::Ascii);
        table.register(0xF191, "Hardware Number", DidDecoder::Ascii);
        table
    }

    /// Add or replace an entry
    pub fn register(&mut self, did: u16, name: impl Into<String>, decoder: DidDecoder) {
        self.entries.insert(
            did,
            DidEntry {
                name: name.into(),
                decoder,
            },
        );
    }

    pub fn get(&self, did: u16) -> Option<&DidEntry> {
        self.entries.get(&did)
    }

    pub fn contains(&self, did: u16) -> bool {
        self.entries.contains_key(&did)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in DID order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &DidEntry)> {
        self.entries.iter().map(|(did, entry)| (*did, entry))
    }

    /// Decode a payload; unknown DIDs come back as raw hex named `0x<DID>`
    pub fn decode(&self, did: u16, payload: &[u8]) -> DidReading {
        match self.entries.get(&did) {
            Some(entry) => DidReading {
                did,
                name: entry.name.clone(),
                value: entry.decoder.decode(payload),
                known: true,
            },
            None => DidReading {
                did,
                name: format!("0x{}", format_did(did)),
                value: raw_hex(payload),
                known: false,
            },
        }
    }

    /// Decode the body of a ReadDataByIdentifier response (DID high, DID low, payload)
    pub fn decode_response(&self, body: &[u8]) -> ConvResult<DidReading> {
        if body.len() < 2 {
            return Err(ConvError::DataTooShort {
                expected: 2,
                actual: body.len(),
            });
        }
        let did = u16::from_be_bytes([body[0], body[1]]);
        Ok(self.decode(did, &body[2..]))
    }

    pub fn from_json(content: &str) -> ConvResult<Self> {
        let defs: HashMap<String, DidEntryDef> = serde_json::from_str(content)?;
        Self::from_defs(defs)
    }

    pub fn from_yaml(content: &str) -> ConvResult<Self> {
        let defs: HashMap<String, DidEntryDef> = serde_yaml::from_str(content)?;
        Self::from_defs(defs)
    }

    pub fn from_toml(content: &str) -> ConvResult<Self> {
        let defs: HashMap<String, DidEntryDef> = toml::from_str(content)?;
        Self::from_defs(defs)
    }

    /// Load a definition file, format chosen by extension (JSON if unknown)
    pub fn from_file(path: impl AsRef<Path>) -> ConvResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let table = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            Some("toml") => Self::from_toml(&content)?,
            _ => Self::from_json(&content)?,
        };
        debug!(path = %path.display(), entries = table.len(), "Loaded DID table");
        Ok(table)
    }

    /// Load a definition file, falling back to [`DidTable::builtin`]
    ///
    /// A missing or unreadable file is not an error: the failure is logged
    /// and the built-in table is used instead.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };
        match Self::from_file(path) {
            Ok(table) => table,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load DID table, using built-in definitions");
                Self::builtin()
            }
        }
    }

    /// Entries with a bad DID or width are logged and skipped
    fn from_defs(defs: HashMap<String, DidEntryDef>) -> ConvResult<Self> {
        let mut table = Self::new();
        for (key, def) in defs {
            match Self::resolve(&key, &def) {
                Ok((did, decoder)) => table.register(did, def.name, decoder),
                Err(e) => warn!(did = %key, error = %e, "Skipping DID definition"),
            }
        }
        Ok(table)
    }

    /// An unknown decoder name keeps the entry and falls back to raw hex
    fn resolve(key: &str, def: &DidEntryDef) -> ConvResult<(u16, DidDecoder)> {
        let did = parse_did(key)?;
        let decoder = match DidDecoder::from_name(&def.decoder, def.byte_count) {
            Some(decoder) => decoder?,
            None => {
                warn!(did = %key, decoder = %def.decoder, "Unknown decoder, showing raw hex");
                DidDecoder::Hex
            }
        };
        Ok((did, decoder))
    }
}
