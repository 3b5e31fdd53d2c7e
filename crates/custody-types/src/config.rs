//! Configuration types for custody rollup parties and validators.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{constants, CustodyError, Result};

/// Wire codec settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Expected `BeginString` header value.
    pub begin_string: String,
    /// Single-character token separator.
    pub separator: char,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            begin_string: constants::DEFAULT_BEGIN_STRING.to_string(),
            separator: constants::DEFAULT_SEPARATOR,
        }
    }
}

/// Threshold signer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Number of nonces (`v`) each party commits per signing attempt.
    pub nonces_per_party: usize,
    /// Bound on the round-1 → round-2 wait.
    pub round_timeout: Duration,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            nonces_per_party: constants::DEFAULT_NONCES_PER_PARTY,
            round_timeout: Duration::from_millis(constants::ROUND_TIMEOUT_MS),
        }
    }
}

/// Validator consensus loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Interval between polls of the settlement contract.
    pub poll_interval: Duration,
    /// Delay from "now" to the next epoch's settlement start.
    pub settlement_delay: Duration,
    /// Duration of the settlement and voting windows.
    pub phase_duration: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            settlement_delay: Duration::from_secs(constants::DEFAULT_SETTLEMENT_DELAY_SECS),
            phase_duration: Duration::from_secs(constants::DEFAULT_PHASE_DURATION_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Price / funding feed selection
// ---------------------------------------------------------------------------

/// Closed set of price/funding backends.
///
/// The backend is chosen once from `{exchange, market}` when the configuration
/// is loaded. The feed implementations themselves live outside this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedSource {
    BinanceSpot,
    BinancePerpetual,
    BybitPerpetual,
    HyperliquidPerpetual,
}

impl FeedSource {
    /// Resolve a backend from an exchange name and market kind.
    pub fn resolve(exchange: &str, market: &str) -> Result<Self> {
        match (
            exchange.to_ascii_lowercase().as_str(),
            market.to_ascii_lowercase().as_str(),
        ) {
            ("binance", "spot") => Ok(Self::BinanceSpot),
            ("binance", "perpetual" | "perp") => Ok(Self::BinancePerpetual),
            ("bybit", "perpetual" | "perp") => Ok(Self::BybitPerpetual),
            ("hyperliquid", "perpetual" | "perp") => Ok(Self::HyperliquidPerpetual),
            _ => Err(CustodyError::Configuration(format!(
                "no feed backend for exchange={exchange} market={market}"
            ))),
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BinanceSpot => write!(f, "binance/spot"),
            Self::BinancePerpetual => write!(f, "binance/perpetual"),
            Self::BybitPerpetual => write!(f, "bybit/perpetual"),
            Self::HyperliquidPerpetual => write!(f, "hyperliquid/perpetual"),
        }
    }
}

/// A configured feed: the instrument symbol and the `{exchange, market}` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub symbol: String,
    pub exchange: String,
    pub market: String,
}

impl FeedConfig {
    /// Resolve this entry's backend.
    pub fn source(&self) -> Result<FeedSource> {
        FeedSource::resolve(&self.exchange, &self.market)
    }
}

// ---------------------------------------------------------------------------
// RollupConfig
// ---------------------------------------------------------------------------

/// Top-level configuration of one rollup party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl RollupConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints and resolve every feed backend.
    pub fn validate(&self) -> Result<()> {
        if self.signer.nonces_per_party == 0 {
            return Err(CustodyError::Configuration(
                "signer.nonces_per_party must be > 0".into(),
            ));
        }
        if self.validator.poll_interval.is_zero() {
            return Err(CustodyError::Configuration(
                "validator.poll_interval must be > 0".into(),
            ));
        }
        if !self.codec.separator.is_ascii() || self.codec.separator == '=' {
            return Err(CustodyError::Configuration(format!(
                "invalid codec separator {:?}",
                self.codec.separator
            )));
        }
        for feed in &self.feeds {
            feed.source()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RollupConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.codec.separator, '\x01');
        assert_eq!(cfg.signer.nonces_per_party, 1);
        assert_eq!(cfg.validator.poll_interval.as_millis(), 5000);
    }

    #[test]
    fn feed_resolution_is_closed() {
        assert_eq!(
            FeedSource::resolve("Binance", "perp").unwrap(),
            FeedSource::BinancePerpetual
        );
        assert_eq!(
            FeedSource::resolve("hyperliquid", "perpetual").unwrap(),
            FeedSource::HyperliquidPerpetual
        );
        let err = FeedSource::resolve("nowhere", "spot").unwrap_err();
        assert!(matches!(err, CustodyError::Configuration(_)));
    }

    #[test]
    fn from_json_with_partial_sections() {
        let json = r#"{
            "codec": { "begin_string": "X", "separator": "|" },
            "feeds": [ { "symbol": "ETH", "exchange": "bybit", "market": "perp" } ]
        }"#;
        let cfg = RollupConfig::from_json(json).unwrap();
        assert_eq!(cfg.codec.begin_string, "X");
        assert_eq!(cfg.codec.separator, '|');
        assert_eq!(cfg.feeds[0].source().unwrap(), FeedSource::BybitPerpetual);
        assert_eq!(cfg.signer.nonces_per_party, 1);
    }

    #[test]
    fn from_json_rejects_unknown_feed() {
        let json = r#"{ "feeds": [ { "symbol": "X", "exchange": "mystery", "market": "spot" } ] }"#;
        assert!(RollupConfig::from_json(json).is_err());
    }

    #[test]
    fn zero_nonces_rejected() {
        let mut cfg = RollupConfig::default();
        cfg.signer.nonces_per_party = 0;
        assert!(cfg.validate().is_err());
    }
}
