//! Job domain types

use chrono::{DateTime, Utc};

/// The unit of work: one object in one storage container.
///
/// Both fields are non-empty. Fields are private so a descriptor cannot be
/// mutated once built; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobDescriptor {
    source_location: String,
    object_key: String,
}

/// Returned when a descriptor field is empty
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} must not be empty")]
pub struct EmptyFieldError {
    pub field: &'static str,
}

impl JobDescriptor {
    /// Creates a descriptor, rejecting empty fields
    pub fn new(
        source_location: impl Into<String>,
        object_key: impl Into<String>,
    ) -> Result<Self, EmptyFieldError> {
        let source_location = source_location.into();
        let object_key = object_key.into();

        if source_location.is_empty() {
            return Err(EmptyFieldError { field: "bucket" });
        }
        if object_key.is_empty() {
            return Err(EmptyFieldError { field: "key" });
        }

        Ok(Self {
            source_location,
            object_key,
        })
    }

    /// Storage container holding the object (the bucket)
    pub fn source_location(&self) -> &str {
        &self.source_location
    }

    /// Key of the object inside the container
    pub fn object_key(&self) -> &str {
        &self.object_key
    }
}

impl std::fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source_location, self.object_key)
    }
}

/// A decoded queue message: the descriptor plus when the producer stamped it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub descriptor: JobDescriptor,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_descriptor() {
        let job = JobDescriptor::new("my-bucket", "sample.pdf").unwrap();
        assert_eq!(job.source_location(), "my-bucket");
        assert_eq!(job.object_key(), "sample.pdf");
        assert_eq!(job.to_string(), "my-bucket/sample.pdf");
    }

    #[test]
    fn test_empty_fields_rejected() {
        assert_eq!(
            JobDescriptor::new("", "sample.pdf").unwrap_err().field,
            "bucket"
        );
        assert_eq!(JobDescriptor::new("my-bucket", "").unwrap_err().field, "key");
    }

    #[test]
    fn test_structural_equality() {
        let a = JobDescriptor::new("my-bucket", "a.pdf").unwrap();
        let b = JobDescriptor::new("my-bucket".to_string(), "a.pdf".to_string()).unwrap();
        let c = JobDescriptor::new("my-bucket", "b.pdf").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
