//! Human-shareable note strings.
//!
//! A note is the only artifact a depositor keeps:
//!
//! ```text
//! tornado-<currency>-<amount>-<network_id>-0x<124 hex chars>
//! ```
//!
//! The hex payload is `le31(nullifier) ‖ le31(secret)`. Decoding is a strict
//! field-by-field parse; any deviation is a [`NoteFormatError`].

use std::{
    fmt,
    str::FromStr,
};

use alloy::{
    hex,
    primitives::{
        U256,
        utils::parse_ether,
    },
};
use thiserror::Error;

use super::{
    commitment::{
        Commitment,
        NullifierHash,
    },
    secret::{
        PREIMAGE_BYTES,
        Secret,
    },
};

pub const NOTE_PREFIX: &str = "tornado";

/// Hex characters in the preimage payload.
pub const PREIMAGE_HEX_LEN: usize = PREIMAGE_BYTES * 2;

const FIELD_COUNT: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NoteFormatError {
    #[error("note must start with `{NOTE_PREFIX}-`")]
    MissingPrefix,

    #[error("note must have {FIELD_COUNT} dash-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid currency `{0}`")]
    InvalidCurrency(String),

    #[error("invalid amount `{0}`")]
    InvalidAmount(String),

    #[error("invalid network id `{0}`")]
    InvalidNetworkId(String),

    #[error("preimage must be prefixed with 0x")]
    MissingHexPrefix,

    #[error("preimage must be {PREIMAGE_HEX_LEN} hex chars, found {found}")]
    PreimageLength { found: usize },

    #[error("preimage contains a non-hex character")]
    InvalidHex,
}

/// A decoded note: instance metadata plus the depositor's secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    currency: String,
    amount: String,
    network_id: u64,
    secret: Secret,
}

impl Note {
    /// Create a note, validating the metadata so that it re-encodes exactly.
    pub fn new(
        currency: impl Into<String>,
        amount: impl Into<String>,
        network_id: u64,
        secret: Secret,
    ) -> Result<Self, NoteFormatError> {
        let currency = currency.into();
        let amount = amount.into();
        validate_currency(&currency)?;
        validate_amount(&amount)?;

        Ok(Self {
            currency,
            amount,
            network_id,
            secret,
        })
    }

    /// Create a note around a freshly generated secret.
    pub fn random(
        currency: impl Into<String>,
        amount: impl Into<String>,
        network_id: u64,
    ) -> Result<Self, NoteFormatError> {
        Self::new(currency, amount, network_id, Secret::random())
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn commitment(&self) -> Commitment {
        self.secret.commitment()
    }

    pub fn nullifier_hash(&self) -> NullifierHash {
        self.secret.nullifier_hash()
    }

    /// The amount in 18-decimal base units (wei for ETH instances).
    pub fn amount_in_wei(&self) -> Result<U256, NoteFormatError> {
        parse_ether(&self.amount).map_err(|_| NoteFormatError::InvalidAmount(self.amount.clone()))
    }

    /// Serialize to the note string format.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a note string.
    pub fn decode(note: &str) -> Result<Self, NoteFormatError> {
        let fields: Vec<&str> = note.split('-').collect();

        if fields[0] != NOTE_PREFIX {
            return Err(NoteFormatError::MissingPrefix);
        }
        if fields.len() != FIELD_COUNT {
            return Err(NoteFormatError::FieldCount {
                found: fields.len(),
            });
        }

        let currency = fields[1];
        let amount = fields[2];
        validate_currency(currency)?;
        validate_amount(amount)?;
        let network_id = parse_network_id(fields[3])?;
        let preimage = parse_preimage(fields[4])?;

        Ok(Self {
            currency: currency.to_string(),
            amount: amount.to_string(),
            network_id,
            secret: Secret::from_preimage(&preimage),
        })
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{NOTE_PREFIX}-{}-{}-{}-0x{}",
            self.currency,
            self.amount,
            self.network_id,
            hex::encode(self.secret.preimage())
        )
    }
}

impl FromStr for Note {
    type Err = NoteFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

fn validate_currency(currency: &str) -> Result<(), NoteFormatError> {
    let valid = !currency.is_empty()
        && currency
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(NoteFormatError::InvalidCurrency(currency.to_string()))
    }
}

fn validate_amount(amount: &str) -> Result<(), NoteFormatError> {
    let valid = !amount.is_empty()
        && amount.bytes().any(|b| b.is_ascii_digit())
        && amount.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && amount.bytes().filter(|&b| b == b'.').count() <= 1;
    if valid {
        Ok(())
    } else {
        Err(NoteFormatError::InvalidAmount(amount.to_string()))
    }
}

fn parse_network_id(field: &str) -> Result<u64, NoteFormatError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NoteFormatError::InvalidNetworkId(field.to_string()));
    }
    field
        .parse()
        .map_err(|_| NoteFormatError::InvalidNetworkId(field.to_string()))
}

fn parse_preimage(field: &str) -> Result<[u8; PREIMAGE_BYTES], NoteFormatError> {
    let payload = field
        .strip_prefix("0x")
        .ok_or(NoteFormatError::MissingHexPrefix)?;

    if payload.len() != PREIMAGE_HEX_LEN {
        return Err(NoteFormatError::PreimageLength {
            found: payload.len(),
        });
    }
    if !payload.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(NoteFormatError::InvalidHex);
    }

    let mut preimage = [0u8; PREIMAGE_BYTES];
    hex::decode_to_slice(payload, &mut preimage).map_err(|_| NoteFormatError::InvalidHex)?;
    Ok(preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sample note taken from a real local-network deposit.
    const SAMPLE: &str = "tornado-eth-1-102-0xe943e27f37cef8aa515fd8fd09c740245e2ead0d7c6517a684d4cca31d6552f6b1ed369b3df7d51ba2bbaf25f779865e305700c5a87a479f095f41bad361";

    #[test]
    fn test_decode_sample_note() {
        let note = Note::decode(SAMPLE).unwrap();
        assert_eq!(note.currency(), "eth");
        assert_eq!(note.amount(), "1");
        assert_eq!(note.network_id(), 102);
        assert_eq!(note.encode(), SAMPLE);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for (currency, amount, network_id) in
            [("eth", "0.1", 1u64), ("dai", "100", 5), ("usdc_e", "1000", 56)]
        {
            let note = Note::random(currency, amount, network_id).unwrap();
            let decoded: Note = note.encode().parse().unwrap();
            assert_eq!(decoded, note);
            assert_eq!(decoded.secret(), note.secret());
        }
    }

    #[test]
    fn test_encoded_payload_is_lowercase_and_fixed_width() {
        let note = Note::random("eth", "1", 1).unwrap();
        let encoded = note.encode();
        let payload = encoded.rsplit('-').next().unwrap();
        assert_eq!(payload.len(), 2 + PREIMAGE_HEX_LEN);
        assert!(!payload[2..].bytes().any(|b| b.is_ascii_uppercase()));
    }

    #[test]
    fn test_uppercase_payload_is_accepted() {
        let upper = SAMPLE.replace("0xe943", "0xE943");
        let note = Note::decode(&upper).unwrap();
        assert_eq!(note, Note::decode(SAMPLE).unwrap());
    }

    #[test]
    fn test_not_a_note() {
        assert_eq!(Note::decode("not-a-note"), Err(NoteFormatError::MissingPrefix));
        assert_eq!(Note::decode(""), Err(NoteFormatError::MissingPrefix));
    }

    #[test]
    fn test_wrong_field_count() {
        assert_eq!(
            Note::decode("tornado-eth-1-0xabc"),
            Err(NoteFormatError::FieldCount { found: 4 })
        );
        let extra = format!("{SAMPLE}-trailing");
        assert_eq!(
            Note::decode(&extra),
            Err(NoteFormatError::FieldCount { found: 6 })
        );
    }

    #[test]
    fn test_short_preimage_fails() {
        let short = &SAMPLE[..SAMPLE.len() - 2];
        assert_eq!(
            Note::decode(short),
            Err(NoteFormatError::PreimageLength {
                found: PREIMAGE_HEX_LEN - 2
            })
        );
    }

    #[test]
    fn test_bad_fields_fail() {
        let bad_hex = SAMPLE.replace("0xe943", "0xz943");
        assert_eq!(Note::decode(&bad_hex), Err(NoteFormatError::InvalidHex));

        let no_prefix = SAMPLE.replace("-0xe943", "-e943");
        assert_eq!(Note::decode(&no_prefix), Err(NoteFormatError::MissingHexPrefix));

        let bad_net = SAMPLE.replace("-102-", "-1o2-");
        assert!(matches!(
            Note::decode(&bad_net),
            Err(NoteFormatError::InvalidNetworkId(_))
        ));

        let bad_amount = SAMPLE.replace("-1-102-", "-1.2.3-102-");
        assert!(matches!(
            Note::decode(&bad_amount),
            Err(NoteFormatError::InvalidAmount(_))
        ));

        let bad_currency = SAMPLE.replace("-eth-", "-e th-");
        assert!(matches!(
            Note::decode(&bad_currency),
            Err(NoteFormatError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn test_amount_in_wei() {
        let note = Note::random("eth", "0.1", 1).unwrap();
        assert_eq!(
            note.amount_in_wei().unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
    }

    #[test]
    fn test_new_rejects_unencodable_metadata() {
        assert!(Note::new("e-th", "1", 1, Secret::random()).is_err());
        assert!(Note::new("eth", "", 1, Secret::random()).is_err());
    }
}
