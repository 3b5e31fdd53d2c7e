//! Built-in `CUSTODY.1.0` dictionary: quotes, fills and collateral transfers.
//!
//! Every message type carries the session header (`MsgSeqNum`,
//! `SenderCompID`, `TargetCompID`, `SendingTime`) as required tags so the
//! session sequencer can order it.

use custody_types::{
    Result,
    constants::{TAG_MSG_SEQ_NUM, TAG_SENDER_COMP_ID, TAG_SENDING_TIME, TAG_TARGET_COMP_ID},
};

use crate::dictionary::{FieldType, TagDictionary, optional, required};

/// `MsgType` of a two-sided quote.
pub const MSG_QUOTE: &str = "S";
/// `MsgType` of a fill (execution report).
pub const MSG_FILL: &str = "8";
/// `MsgType` of a collateral transfer.
pub const MSG_TRANSFER: &str = "U1";

impl TagDictionary {
    /// The built-in custody dictionary.
    pub fn custody_v1() -> Result<Self> {
        Self::builder()
            // Session header
            .field(TAG_MSG_SEQ_NUM, "MsgSeqNum", FieldType::Int)
            .field(TAG_SENDER_COMP_ID, "SenderCompID", FieldType::String)
            .field(TAG_TARGET_COMP_ID, "TargetCompID", FieldType::String)
            .field(TAG_SENDING_TIME, "SendingTime", FieldType::UtcTimestamp)
            // Instrument and pricing
            .field(55, "Symbol", FieldType::String)
            .field(117, "QuoteID", FieldType::String)
            .field(132, "BidPx", FieldType::Decimal)
            .field(133, "OfferPx", FieldType::Decimal)
            .field(134, "BidSize", FieldType::Decimal)
            .field(135, "OfferSize", FieldType::Decimal)
            .field(62, "ValidUntilTime", FieldType::UtcTimestamp)
            // Fills
            .field(17, "ExecID", FieldType::String)
            .field(37, "OrderID", FieldType::String)
            .field(54, "Side", FieldType::String)
            .field(31, "LastPx", FieldType::Decimal)
            .field(32, "LastQty", FieldType::Decimal)
            .field(448, "PartyID", FieldType::String)
            .field(452, "PartyRole", FieldType::Int)
            .group(453, "Parties", &[448, 452])
            // Collateral transfers
            .field(15, "Currency", FieldType::String)
            .field(5001, "TransferID", FieldType::String)
            .field(5002, "IsCollateral", FieldType::Boolean)
            .field(5011, "FromAccount", FieldType::String)
            .field(5012, "ToAccount", FieldType::String)
            .field(5013, "LegAmount", FieldType::Decimal)
            .group(5010, "TransferLegs", &[5011, 5012, 5013])
            .message(
                MSG_QUOTE,
                "Quote",
                &[
                    required(TAG_MSG_SEQ_NUM),
                    required(TAG_SENDER_COMP_ID),
                    required(TAG_TARGET_COMP_ID),
                    required(TAG_SENDING_TIME),
                    required(117),
                    required(55),
                    optional(132),
                    optional(133),
                    optional(134),
                    optional(135),
                    optional(62),
                ],
            )
            .message(
                MSG_FILL,
                "Fill",
                &[
                    required(TAG_MSG_SEQ_NUM),
                    required(TAG_SENDER_COMP_ID),
                    required(TAG_TARGET_COMP_ID),
                    required(TAG_SENDING_TIME),
                    required(17),
                    required(37),
                    required(55),
                    required(54),
                    required(31),
                    required(32),
                    optional(453),
                ],
            )
            .message(
                MSG_TRANSFER,
                "Transfer",
                &[
                    required(TAG_MSG_SEQ_NUM),
                    required(TAG_SENDER_COMP_ID),
                    required(TAG_TARGET_COMP_ID),
                    required(TAG_SENDING_TIME),
                    required(5001),
                    required(15),
                    required(5002),
                    required(5010),
                ],
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagDef;

    #[test]
    fn builds() {
        let dict = TagDictionary::custody_v1().unwrap();
        let types: Vec<&str> = dict.message_types().collect();
        assert_eq!(types, vec![MSG_FILL, MSG_QUOTE, MSG_TRANSFER]);
        assert!(matches!(dict.tag(453), Some(TagDef::Group(_))));
        assert!(dict.message(MSG_TRANSFER).unwrap().tags.iter().all(|t| t.required));
    }
}
