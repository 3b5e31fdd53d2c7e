//! Fixture dictionaries and messages for downstream test suites.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use custody_types::{CodecConfig, constants::DEFAULT_BEGIN_STRING};

use crate::{
    Codec, FieldType, TagDictionary, WireMessage,
    custody_v1::{MSG_FILL, MSG_QUOTE, MSG_TRANSFER},
    format_utc_timestamp, optional, required,
};

/// Codec over [`TagDictionary::custody_v1`] with default settings.
///
/// # Panics
/// If the built-in dictionary fails to build.
#[must_use]
pub fn custody_codec() -> Codec {
    let dictionary = TagDictionary::custody_v1().expect("built-in dictionary is valid");
    Codec::new(Arc::new(dictionary), CodecConfig::default())
}

/// `LegGroup` / `Parties` dictionary with message type `D`, version `X`, `|` separator.
///
/// # Panics
/// If the fixture dictionary fails to build.
#[must_use]
pub fn leg_codec() -> Codec {
    let dictionary = TagDictionary::builder()
        .field(55, "Symbol", FieldType::String)
        .field(448, "PartyID", FieldType::String)
        .field(38, "OrderQty", FieldType::Decimal)
        .group(453, "Parties", &[448])
        .group(555, "LegGroup", &[55, 453])
        .message("D", "NewOrder", &[required(555), optional(38)])
        .build()
        .expect("fixture dictionary is valid");
    Codec::new(
        Arc::new(dictionary),
        CodecConfig {
            begin_string: "X".into(),
            separator: '|',
        },
    )
}

fn header(msg_type: &str, sender: &str, target: &str, seq: u64, at: &DateTime<Utc>) -> WireMessage {
    WireMessage::with_header(DEFAULT_BEGIN_STRING, msg_type)
        .with("MsgSeqNum", seq.to_string())
        .with("SenderCompID", sender)
        .with("TargetCompID", target)
        .with("SendingTime", format_utc_timestamp(at))
}

/// A valid `custody_v1` quote.
#[must_use]
pub fn quote(sender: &str, target: &str, seq: u64, at: &DateTime<Utc>) -> WireMessage {
    header(MSG_QUOTE, sender, target, seq, at)
        .with("QuoteID", format!("q-{seq}"))
        .with("Symbol", "BTC-USD")
        .with("BidPx", "64000.5")
        .with("OfferPx", "64010")
}

/// A valid `custody_v1` fill with two parties.
#[must_use]
pub fn fill(sender: &str, target: &str, seq: u64, at: &DateTime<Utc>) -> WireMessage {
    header(MSG_FILL, sender, target, seq, at)
        .with("ExecID", format!("e-{seq}"))
        .with("OrderID", format!("o-{seq}"))
        .with("Symbol", "BTC-USD")
        .with("Side", "1")
        .with("LastPx", "64005")
        .with("LastQty", "0.25")
        .with(
            "Parties",
            vec![
                WireMessage::new().with("PartyID", sender).with("PartyRole", "1"),
                WireMessage::new().with("PartyID", target).with("PartyRole", "17"),
            ],
        )
}

/// A valid `custody_v1` collateral transfer with one leg.
#[must_use]
pub fn transfer(sender: &str, target: &str, seq: u64, at: &DateTime<Utc>) -> WireMessage {
    header(MSG_TRANSFER, sender, target, seq, at)
        .with("TransferID", format!("t-{seq}"))
        .with("Currency", "USDC")
        .with("IsCollateral", "Y")
        .with(
            "TransferLegs",
            vec![
                WireMessage::new()
                    .with("FromAccount", sender)
                    .with("ToAccount", target)
                    .with("LegAmount", "1000"),
            ],
        )
}
