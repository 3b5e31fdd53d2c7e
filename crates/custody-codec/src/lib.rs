//! # custody-codec
//!
//! **Wire Plane**: converts [`WireMessage`] trees to and from the flat
//! `tag=value` token stream exchanged between custody counterparties.
//!
//! Everything is driven by a [`TagDictionary`]: which message types exist,
//! the order their tags are emitted in, each scalar's type, and the
//! per-item template of every repeating group. The codec refuses to encode
//! anything the dictionary does not accept, and decodes with a single
//! left-to-right scan over an explicit frame stack.
//!
//! ```text
//! 8=X|35=D|555=2|55=AAPL|453=2|448=p1|448=p2|55=MSFT|453=1|448=p3
//! ```

pub mod codec;
pub mod custody_v1;
pub mod dictionary;
pub mod message;
pub mod validate;

#[cfg(any(test, feature = "test-helpers"))]
pub mod fixtures;

pub use codec::Codec;
pub use dictionary::{
    FieldDef, FieldType, GroupDef, MessageDef, MessageTag, TagDef, TagDictionary,
    TagDictionaryBuilder, optional, required,
};
pub use message::{WireMessage, WireValue};
pub use validate::{format_utc_timestamp, parse_utc_timestamp};
