//! Job message wire format
//!
//! Queue message bodies are JSON objects:
//!
//! ```json
//! {"version": "v1", "bucket": "my-bucket", "key": "sample.pdf", "submitted_at": "2026-03-01T10:00:00Z"}
//! ```
//!
//! `version`, `bucket` and `key` are required, `submitted_at` is optional and
//! unknown fields are ignored. Bodies with any other version are rejected so a
//! dispatcher never misreads a message written by a newer producer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::job::{JobDescriptor, Submission};

/// Version written by this crate
pub const WIRE_VERSION: &str = "v1";

/// Why a message body could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, not an object, or a field of the wrong type
    #[error("malformed message body: {0}")]
    Malformed(String),

    #[error("message body has no version")]
    MissingVersion,

    #[error("unsupported message version '{0}'")]
    UnsupportedVersion(String),

    #[error("message body is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("message field '{0}' is empty")]
    EmptyField(&'static str),
}

/// Decoding options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Accept bodies without a `version` field and read them as v1.
    /// Early producers wrote such bodies.
    pub allow_unversioned: bool,
}

/// Serialized form of a job message
#[derive(Debug, Clone, Serialize)]
struct JobEnvelope<'a> {
    version: &'static str,
    bucket: &'a str,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    submitted_at: Option<DateTime<Utc>>,
}

/// Lenient view used for decoding so each missing field gets its own error
#[derive(Debug, Deserialize)]
struct IncomingEnvelope {
    version: Option<String>,
    bucket: Option<String>,
    key: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

/// Encodes a job as a v1 message body
pub fn encode_job(
    job: &JobDescriptor,
    submitted_at: Option<DateTime<Utc>>,
) -> Result<Vec<u8>, serde_json::Error> {
    let envelope = JobEnvelope {
        version: WIRE_VERSION,
        bucket: job.source_location(),
        key: job.object_key(),
        submitted_at,
    };

    serde_json::to_vec(&envelope)
}

/// Decodes a message body into a submission
pub fn decode_job(body: &[u8], options: DecodeOptions) -> Result<Submission, DecodeError> {
    let incoming: IncomingEnvelope =
        serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match incoming.version.as_deref() {
        Some(WIRE_VERSION) => {}
        Some(other) => return Err(DecodeError::UnsupportedVersion(other.to_string())),
        None if options.allow_unversioned => {}
        None => return Err(DecodeError::MissingVersion),
    }

    let bucket = incoming.bucket.ok_or(DecodeError::MissingField("bucket"))?;
    let key = incoming.key.ok_or(DecodeError::MissingField("key"))?;

    let descriptor =
        JobDescriptor::new(bucket, key).map_err(|e| DecodeError::EmptyField(e.field))?;

    Ok(Submission {
        descriptor,
        submitted_at: incoming.submitted_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn strict() -> DecodeOptions {
        DecodeOptions::default()
    }

    #[test]
    fn test_encode_then_decode() {
        let job = JobDescriptor::new("my-bucket", "sample.pdf").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();

        let body = encode_job(&job, Some(at)).unwrap();
        let submission = decode_job(&body, strict()).unwrap();

        assert_eq!(submission.descriptor, job);
        assert_eq!(submission.submitted_at, Some(at));
    }

    #[test]
    fn test_encoded_body_shape() {
        let job = JobDescriptor::new("my-bucket", "sample.pdf").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encode_job(&job, None).unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({"version": "v1", "bucket": "my-bucket", "key": "sample.pdf"})
        );
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let body = br#"{"version":"v1","bucket":"b","key":"k","priority":3}"#;
        let submission = decode_job(body, strict()).unwrap();
        assert_eq!(submission.descriptor.object_key(), "k");
        assert!(submission.submitted_at.is_none());
    }

    #[test]
    fn test_non_json_body() {
        let err = decode_job(b"not json at all", strict()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_non_object_body() {
        assert!(matches!(
            decode_job(b"[1, 2, 3]", strict()),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_job(br#"{"version":"v1","bucket":7,"key":"k"}"#, strict()),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_key() {
        let err = decode_job(br#"{"version":"v1","bucket":"b"}"#, strict()).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("key"));
    }

    #[test]
    fn test_empty_bucket() {
        let err = decode_job(br#"{"version":"v1","bucket":"","key":"k"}"#, strict()).unwrap_err();
        assert_eq!(err, DecodeError::EmptyField("bucket"));
    }

    #[test]
    fn test_unknown_version() {
        let err = decode_job(br#"{"version":"v2","bucket":"b","key":"k"}"#, strict()).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedVersion("v2".to_string()));
    }

    #[test]
    fn test_unversioned_body() {
        let body = br#"{"bucket":"my-bucket","key":"sample.pdf"}"#;

        assert_eq!(
            decode_job(body, strict()).unwrap_err(),
            DecodeError::MissingVersion
        );

        let lenient = DecodeOptions {
            allow_unversioned: true,
        };
        let submission = decode_job(body, lenient).unwrap();
        assert_eq!(submission.descriptor.source_location(), "my-bucket");
    }
}
