//! `FreightRecord` (spec §3): an immutable freight price observation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    Ocean,
    Air,
    Road,
    Rail,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Ocean => "OCEAN",
            TransportMode::Air => "AIR",
            TransportMode::Road => "ROAD",
            TransportMode::Rail => "RAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OCEAN" => Some(TransportMode::Ocean),
            "AIR" => Some(TransportMode::Air),
            "ROAD" => Some(TransportMode::Road),
            "RAIL" => Some(TransportMode::Rail),
            _ => None,
        }
    }
}

/// Internal representation choice (DESIGN.md): a closed enum rather than the
/// original's free-form string, since the source only ever assigns one of
/// these three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataQualityFlag {
    Verified,
    Estimated,
    Flagged,
}

/// An immutable observation of a freight price at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreightRecord {
    pub id: String,
    pub record_date: DateTime<Utc>,
    pub origin_id: String,
    pub destination_id: String,
    pub carrier_id: String,
    pub transport_mode: TransportMode,
    pub freight_charge: Decimal,
    pub currency_code: String,
    pub service_level: Option<String>,
    pub additional_charges: BTreeMap<String, Decimal>,
    pub source_system: String,
    pub data_quality_flag: DataQualityFlag,
}

impl FreightRecord {
    /// spec §3 invariants: `freight_charge >= 0`; `currency_code` well-formed
    /// ISO-4217 (3 uppercase letters).
    pub fn validate(&self) -> Result<(), String> {
        if self.freight_charge < Decimal::ZERO {
            return Err(format!(
                "freight_charge must be non-negative, got {}",
                self.freight_charge
            ));
        }
        if !is_valid_currency_code(&self.currency_code) {
            return Err(format!("invalid currency_code: {}", self.currency_code));
        }
        Ok(())
    }

    pub fn route_id(&self) -> String {
        format!("{}:{}", self.origin_id, self.destination_id)
    }
}

pub fn is_valid_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FreightRecord {
        FreightRecord {
            id: "r1".into(),
            record_date: Utc::now(),
            origin_id: "LAX".into(),
            destination_id: "SHA".into(),
            carrier_id: "MAERSK".into(),
            transport_mode: TransportMode::Ocean,
            freight_charge: Decimal::new(100000, 2),
            currency_code: "USD".into(),
            service_level: None,
            additional_charges: BTreeMap::new(),
            source_system: "test".into(),
            data_quality_flag: DataQualityFlag::Verified,
        }
    }

    #[test]
    fn rejects_negative_charge() {
        let mut r = sample();
        r.freight_charge = Decimal::new(-1, 0);
        assert!(r.validate().is_err());
    }

    #[test]
    fn rejects_malformed_currency() {
        let mut r = sample();
        r.currency_code = "usd".into();
        assert!(r.validate().is_err());
        r.currency_code = "US".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn accepts_valid_record() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn transport_mode_round_trips() {
        for m in [TransportMode::Ocean, TransportMode::Air, TransportMode::Road, TransportMode::Rail] {
            assert_eq!(TransportMode::parse(m.as_str()), Some(m));
        }
    }
}
