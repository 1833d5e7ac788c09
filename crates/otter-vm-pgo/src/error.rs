//! PGO errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors decoding the binary layout format
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended inside a record
    #[error("Unexpected end of layout data at byte {0}")]
    UnexpectedEnd(usize),

    /// Unknown tag byte
    #[error("Invalid {what} tag {tag} at byte {offset}")]
    InvalidTag {
        /// What the tag selects
        what: &'static str,
        /// Tag value
        tag: u8,
        /// Byte offset
        offset: usize,
    },

    /// String key whose stored hash does not match its text
    #[error("Key hash mismatch for {text:?}: stored {stored:#010x}, computed {computed:#010x}")]
    HashMismatch {
        /// Key text
        text: String,
        /// Hash in the data
        stored: u32,
        /// Hash of the text
        computed: u32,
    },

    /// Child node whose parent link does not point at an earlier node
    #[error("Child node {node} links to parent {parent}")]
    InvalidParent {
        /// Node index
        node: u32,
        /// Parent index in the data
        parent: u32,
    },

    /// Root whose in-object slots or size exceed what any shape can hold
    #[error("Root with {inlined_slots} inlined slots and {object_size} bytes exceeds the engine ceiling")]
    OversizedRoot {
        /// Inlined slot count in the data
        inlined_slots: u32,
        /// Object size in the data
        object_size: u32,
    },

    /// Key text is not UTF-8
    #[error("Invalid UTF-8 in key at byte {0}")]
    InvalidUtf8(usize),

    /// Data after the last record
    #[error("{0} trailing bytes after layout")]
    TrailingBytes(usize),
}

/// PGO errors
#[derive(Debug, Error)]
pub enum PgoError {
    /// File could not be read or written
    #[error("Failed to access '{path}': {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed configuration
    #[error("Failed to parse config '{path}': {source}")]
    Config {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Malformed recorded profile
    #[error("Invalid profile: {0}")]
    Profile(#[from] serde_json::Error),

    /// Malformed binary layout
    #[error("Invalid layout: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for PGO operations
pub type Result<T> = std::result::Result<T, PgoError>;
