//! Job command handlers
//!
//! Handles enqueueing jobs and looking at message bodies without a
//! dispatcher in the loop.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use colored::*;
use ferry_client::{JobProducer, SqsQueue};
use ferry_core::domain::idempotency::{IdempotencyPolicy, IdempotencyToken};
use ferry_core::domain::job::JobDescriptor;
use ferry_core::dto::job::{DecodeError, DecodeOptions, decode_job, encode_job};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;

/// A decoded body together with the token a deduplicating launcher would see
struct Inspection {
    descriptor: JobDescriptor,
    submitted_at: Option<DateTime<Utc>>,
    token: IdempotencyToken,
}

/// Enqueue a job
pub async fn enqueue(config: &Config, bucket: &str, key: &str) -> Result<()> {
    let queue_url = config.require_queue_url()?;
    let producer = JobProducer::new(Arc::new(SqsQueue::from_env(queue_url).await));

    let handle = producer
        .enqueue(bucket, key)
        .await
        .with_context(|| format!("Failed to enqueue {}/{}", bucket, key))?;

    println!("{} {}/{}", "Enqueued".green().bold(), bucket, key);
    println!("  {} {}", "Message ID:".bold(), handle.message_id);

    Ok(())
}

/// Print the message body for a job
pub fn encode(bucket: &str, key: &str) -> Result<()> {
    println!("{}", encoded_body(bucket, key, Utc::now())?);
    Ok(())
}

/// Decode a message body and show what the dispatcher would do with it
pub fn inspect(config: &Config, file: Option<&Path>) -> Result<()> {
    let body = match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read stdin")?;
            body
        }
    };

    match inspect_body(&body, config) {
        Ok(inspection) => {
            print_inspection(&inspection);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Would be dead-lettered:".red().bold(), e);
            Err(anyhow!("invalid message body: {}", e))
        }
    }
}

fn encoded_body(bucket: &str, key: &str, submitted_at: DateTime<Utc>) -> Result<String> {
    let job = JobDescriptor::new(bucket, key)?;
    let body = encode_job(&job, Some(submitted_at))?;
    Ok(String::from_utf8(body)?)
}

fn inspect_body(body: &[u8], config: &Config) -> Result<Inspection, DecodeError> {
    let submission = decode_job(
        body,
        DecodeOptions {
            allow_unversioned: config.allow_unversioned,
        },
    )?;

    let policy = IdempotencyPolicy::new(config.idempotency_window);
    let token = policy.token_for(&submission.descriptor, submission.submitted_at);

    Ok(Inspection {
        descriptor: submission.descriptor,
        submitted_at: submission.submitted_at,
        token,
    })
}

fn print_inspection(inspection: &Inspection) {
    println!("{}", "Valid job message".green().bold());
    println!(
        "  {} {}",
        "Bucket:".bold(),
        inspection.descriptor.source_location()
    );
    println!("  {} {}", "Key:".bold(), inspection.descriptor.object_key());
    match inspection.submitted_at {
        Some(at) => println!("  {} {}", "Submitted:".bold(), at.to_rfc3339()),
        None => println!("  {} {}", "Submitted:".bold(), "unknown".dimmed()),
    }
    println!("  {} {}", "Token:".bold(), inspection.token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn config(allow_unversioned: bool) -> Config {
        Config {
            queue_url: None,
            idempotency_window: Duration::from_secs(3600),
            allow_unversioned,
        }
    }

    #[test]
    fn test_encoded_body_inspects_cleanly() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 0).unwrap();
        let body = encoded_body("my-bucket", "sample.pdf", at).unwrap();

        let inspection = inspect_body(body.as_bytes(), &config(false)).unwrap();
        assert_eq!(inspection.descriptor.source_location(), "my-bucket");
        assert_eq!(inspection.descriptor.object_key(), "sample.pdf");
        assert_eq!(inspection.submitted_at, Some(at));

        let expected = IdempotencyPolicy::new(Duration::from_secs(3600))
            .token_for(&inspection.descriptor, Some(at));
        assert_eq!(inspection.token, expected);
    }

    #[test]
    fn test_encode_rejects_empty_key() {
        assert!(encoded_body("my-bucket", "", Utc::now()).is_err());
    }

    #[test]
    fn test_unversioned_body_needs_flag() {
        let body = br#"{"bucket":"my-bucket","key":"sample.pdf"}"#;

        assert_eq!(
            inspect_body(body, &config(false)).err(),
            Some(DecodeError::MissingVersion)
        );
        assert!(inspect_body(body, &config(true)).is_ok());
    }

    #[test]
    fn test_trailing_newline_is_accepted() {
        let body = b"{\"version\":\"v1\",\"bucket\":\"my-bucket\",\"key\":\"a.pdf\"}\n";
        assert!(inspect_body(body, &config(false)).is_ok());
    }
}
