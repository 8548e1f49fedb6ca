//! Fax envelope and its wire format
//!
//! The payload is a MessagePack map keyed by field name, so publishers may
//! emit the fields in any order. The timestamp is written as an RFC 3339
//! string that keeps the sender's UTC offset; the MessagePack timestamp
//! extension (type -1) is accepted on input as well, as UTC. The picture
//! travels as `bin`.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Topic the confirming sender publishes envelopes on
pub const FAX_TOPIC: &str = "fax";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Envelope has neither message nor picture")]
    Empty,
}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// One logical message to be printed
///
/// Never mutated after it has been serialized; consumers only read and
/// render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaxEnvelope {
    /// When the sender confirmed the message (display only)
    #[serde(rename = "Timestamp", with = "timestamp")]
    pub timestamp: DateTime<FixedOffset>,

    /// Display name of the originator, may be empty
    #[serde(rename = "Sender", default)]
    pub sender: String,

    #[serde(rename = "Message", default)]
    pub message: String,

    /// Encoded image file (PNG/JPEG/GIF) as attached by the sender;
    /// empty when there is no picture
    #[serde(rename = "Picture", default, with = "serde_bytes")]
    pub picture: Vec<u8>,
}

impl FaxEnvelope {
    pub fn new(
        timestamp: DateTime<FixedOffset>,
        sender: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            sender: sender.into(),
            message: message.into(),
            picture: Vec::new(),
        }
    }

    /// Attach an encoded picture
    pub fn with_picture(mut self, picture: Vec<u8>) -> Self {
        self.picture = picture;
        self
    }

    pub fn has_picture(&self) -> bool {
        !self.picture.is_empty()
    }

    /// Check the data-model invariant: something must be printable
    pub fn validate(&self) -> EnvelopeResult<()> {
        if self.message.is_empty() && self.picture.is_empty() {
            return Err(EnvelopeError::Empty);
        }
        Ok(())
    }

    /// Serialize to the broker/spool wire format
    pub fn to_bytes(&self) -> EnvelopeResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Parse the broker/spool wire format
    pub fn from_bytes(bytes: &[u8]) -> EnvelopeResult<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// `Timestamp` field codec
mod timestamp {
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use serde::de::{self, Deserializer, Visitor};
    use serde::{Deserialize, Serialize, Serializer};
    use serde_bytes::ByteBuf;
    use std::fmt;

    /// MessagePack extension type reserved for timestamps
    const EXT_TIMESTAMP: i8 = -1;

    pub fn serialize<S: Serializer>(
        value: &DateTime<FixedOffset>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<FixedOffset>, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = DateTime<FixedOffset>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an RFC 3339 string or a MessagePack timestamp extension")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse::<DateTime<FixedOffset>>().map_err(E::custom)
        }

        // rmp-serde presents ext values as a newtype around (type, data)
        fn visit_newtype_struct<D: Deserializer<'de>>(
            self,
            deserializer: D,
        ) -> Result<Self::Value, D::Error> {
            let (kind, data) = <(i8, ByteBuf)>::deserialize(deserializer)?;
            if kind != EXT_TIMESTAMP {
                return Err(de::Error::custom(format!(
                    "unexpected extension type {kind}"
                )));
            }
            from_ext(&data).map_err(de::Error::custom)
        }
    }

    /// Decode timestamp32, timestamp64 or timestamp96
    fn from_ext(data: &[u8]) -> Result<DateTime<FixedOffset>, String> {
        let (secs, nanos) = match data.len() {
            4 => {
                let secs = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                (i64::from(secs), 0)
            }
            8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(data);
                let packed = u64::from_be_bytes(raw);
                ((packed & 0x3_ffff_ffff) as i64, (packed >> 34) as u32)
            }
            12 => {
                let nanos = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&data[4..]);
                (i64::from_be_bytes(raw), nanos)
            }
            n => return Err(format!("invalid timestamp extension length {n}")),
        };
        if nanos >= 1_000_000_000 {
            return Err(format!("invalid timestamp nanoseconds {nanos}"));
        }
        Utc.timestamp_opt(secs, nanos)
            .single()
            .map(|t| t.fixed_offset())
            .ok_or_else(|| format!("timestamp out of range: {secs}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(offset_hours: i32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(2018, 3, 14, 15, 9, 26)
            .unwrap()
    }

    #[test]
    fn test_round_trip_without_picture() {
        let fax = FaxEnvelope::new(at(1), "Alice", "Hello");
        let bytes = fax.to_bytes().unwrap();
        let back = FaxEnvelope::from_bytes(&bytes).unwrap();

        assert_eq!(back, fax);
        assert!(back.picture.is_empty());
    }

    #[test]
    fn test_round_trip_keeps_offset_and_picture() {
        let fax = FaxEnvelope::new(at(-5), "Bob", "").with_picture(vec![0x89, b'P', b'N', b'G']);
        let back = FaxEnvelope::from_bytes(&fax.to_bytes().unwrap()).unwrap();

        assert_eq!(back.timestamp.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(back.timestamp, fax.timestamp);
        assert_eq!(back.picture, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        #[derive(Serialize)]
        struct Partial<'a> {
            #[serde(rename = "Timestamp")]
            timestamp: &'a str,
            #[serde(rename = "Message")]
            message: &'a str,
        }

        let bytes = rmp_serde::to_vec_named(&Partial {
            timestamp: "2018-03-14T15:09:26+01:00",
            message: "ciao",
        })
        .unwrap();
        let fax = FaxEnvelope::from_bytes(&bytes).unwrap();

        assert_eq!(fax.sender, "");
        assert_eq!(fax.message, "ciao");
        assert!(!fax.has_picture());
    }

    /// Map as written by a sender that encodes time natively
    fn ext_payload(ext: &[u8]) -> Vec<u8> {
        let mut out = vec![0x84];
        out.push(0xa9);
        out.extend_from_slice(b"Timestamp");
        out.extend_from_slice(ext);
        out.push(0xa6);
        out.extend_from_slice(b"Sender");
        out.push(0xa5);
        out.extend_from_slice(b"Alice");
        out.push(0xa7);
        out.extend_from_slice(b"Message");
        out.push(0xa5);
        out.extend_from_slice(b"Hello");
        out.push(0xa7);
        out.extend_from_slice(b"Picture");
        out.extend_from_slice(&[0xc4, 0x00]);
        out
    }

    #[test]
    fn test_decode_timestamp32_extension() {
        let mut ext = vec![0xd6, 0xff];
        ext.extend_from_slice(&1_520_000_000u32.to_be_bytes());

        let fax = FaxEnvelope::from_bytes(&ext_payload(&ext)).unwrap();
        assert_eq!(fax.timestamp.timestamp(), 1_520_000_000);
        assert_eq!(fax.timestamp.offset().local_minus_utc(), 0);
        assert_eq!(fax.sender, "Alice");
        assert_eq!(fax.message, "Hello");
        assert!(!fax.has_picture());
    }

    #[test]
    fn test_decode_timestamp64_and_96_extensions() {
        let packed = (250_000_000u64 << 34) | 1_520_000_000u64;
        let mut ext64 = vec![0xd7, 0xff];
        ext64.extend_from_slice(&packed.to_be_bytes());
        let fax = FaxEnvelope::from_bytes(&ext_payload(&ext64)).unwrap();
        assert_eq!(fax.timestamp.timestamp(), 1_520_000_000);
        assert_eq!(fax.timestamp.timestamp_subsec_nanos(), 250_000_000);

        let mut ext96 = vec![0xc7, 12, 0xff];
        ext96.extend_from_slice(&7u32.to_be_bytes());
        ext96.extend_from_slice(&(-86_400i64).to_be_bytes());
        let fax = FaxEnvelope::from_bytes(&ext_payload(&ext96)).unwrap();
        assert_eq!(fax.timestamp.timestamp(), -86_400);
        assert_eq!(fax.timestamp.timestamp_subsec_nanos(), 7);
    }

    #[test]
    fn test_foreign_extension_is_decode_error() {
        let ext = [0xd6, 0x05, 0, 0, 0, 1];
        let err = FaxEnvelope::from_bytes(&ext_payload(&ext)).unwrap_err();
        assert!(matches!(err, EnvelopeError::Decode(_)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = FaxEnvelope::from_bytes(&[0xC1, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, EnvelopeError::Decode(_)));
    }

    #[test]
    fn test_validate() {
        assert!(FaxEnvelope::new(at(0), "A", "text").validate().is_ok());
        assert!(
            FaxEnvelope::new(at(0), "A", "")
                .with_picture(vec![1])
                .validate()
                .is_ok()
        );
        assert!(matches!(
            FaxEnvelope::new(at(0), "A", "").validate(),
            Err(EnvelopeError::Empty)
        ));
    }
}
