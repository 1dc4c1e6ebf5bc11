//! Launch domain types
//!
//! A [`LaunchTemplate`] holds the static runtime configuration of the task to
//! start. Combining it with one [`JobDescriptor`] yields one [`LaunchRequest`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::idempotency::IdempotencyToken;
use super::job::JobDescriptor;

/// Environment variable carrying the bucket into the launched container
pub const SOURCE_BUCKET_ENV: &str = "SOURCE_BUCKET";

/// Environment variable carrying the object key into the launched container
pub const OBJECT_KEY_ENV: &str = "OBJECT_KEY";

/// Whether the launched task gets a public IP address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignPublicIp {
    Enabled,
    Disabled,
}

impl FromStr for AssignPublicIp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ENABLED" => Ok(AssignPublicIp::Enabled),
            "DISABLED" => Ok(AssignPublicIp::Disabled),
            other => Err(format!(
                "invalid public IP policy '{}', expected ENABLED or DISABLED",
                other
            )),
        }
    }
}

impl std::fmt::Display for AssignPublicIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignPublicIp::Enabled => write!(f, "ENABLED"),
            AssignPublicIp::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// Capacity type the scheduler should place the task on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchType {
    Fargate,
    FargateSpot,
    Ec2,
}

impl FromStr for LaunchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FARGATE" => Ok(LaunchType::Fargate),
            "FARGATE_SPOT" => Ok(LaunchType::FargateSpot),
            "EC2" => Ok(LaunchType::Ec2),
            other => Err(format!(
                "invalid launch type '{}', expected FARGATE, FARGATE_SPOT or EC2",
                other
            )),
        }
    }
}

impl std::fmt::Display for LaunchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchType::Fargate => write!(f, "FARGATE"),
            LaunchType::FargateSpot => write!(f, "FARGATE_SPOT"),
            LaunchType::Ec2 => write!(f, "EC2"),
        }
    }
}

/// Network placement for the launched task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlacement {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: AssignPublicIp,
}

/// Static runtime configuration shared by every launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplate {
    /// Cluster the task is started on
    pub cluster: String,

    /// Task definition (family, family:revision or full ARN)
    pub task_definition: String,

    pub launch_type: LaunchType,

    pub network: NetworkPlacement,

    /// Container that receives the job environment overrides.
    /// Without it the task is started with its definition unchanged.
    pub container_name: Option<String>,
}

impl LaunchTemplate {
    /// Builds the launch request for one job
    pub fn request_for(
        &self,
        job: &JobDescriptor,
        idempotency_token: Option<IdempotencyToken>,
    ) -> LaunchRequest {
        let container_overrides = self
            .container_name
            .as_ref()
            .map(|name| ContainerOverride {
                container_name: name.clone(),
                environment: vec![
                    (
                        SOURCE_BUCKET_ENV.to_string(),
                        job.source_location().to_string(),
                    ),
                    (OBJECT_KEY_ENV.to_string(), job.object_key().to_string()),
                ],
            });

        LaunchRequest {
            cluster: self.cluster.clone(),
            task_definition: self.task_definition.clone(),
            launch_type: self.launch_type,
            network: self.network.clone(),
            container_overrides,
            idempotency_token,
        }
    }
}

/// Environment injected into one container of the task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOverride {
    pub container_name: String,
    pub environment: Vec<(String, String)>,
}

/// Request to start exactly one task instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub cluster: String,
    pub task_definition: String,
    pub launch_type: LaunchType,
    pub network: NetworkPlacement,
    pub container_overrides: Option<ContainerOverride>,
    pub idempotency_token: Option<IdempotencyToken>,
}

/// Handle of a task accepted by the launcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Launcher-assigned task identifier (an ARN for ECS)
    pub task_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(container_name: Option<&str>) -> LaunchTemplate {
        LaunchTemplate {
            cluster: "ocr-cluster".to_string(),
            task_definition: "ocr-task:3".to_string(),
            launch_type: LaunchType::Fargate,
            network: NetworkPlacement {
                subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
                security_groups: vec!["sg-1".to_string()],
                assign_public_ip: AssignPublicIp::Enabled,
            },
            container_name: container_name.map(str::to_string),
        }
    }

    #[test]
    fn test_request_copies_template() {
        let job = JobDescriptor::new("my-bucket", "sample.pdf").unwrap();
        let req = template(None).request_for(&job, None);

        assert_eq!(req.cluster, "ocr-cluster");
        assert_eq!(req.task_definition, "ocr-task:3");
        assert_eq!(req.network.subnets, vec!["subnet-a", "subnet-b"]);
        assert_eq!(req.network.security_groups, vec!["sg-1"]);
        assert_eq!(req.network.assign_public_ip, AssignPublicIp::Enabled);
        assert!(req.container_overrides.is_none());
        assert!(req.idempotency_token.is_none());
    }

    #[test]
    fn test_request_injects_job_environment() {
        let job = JobDescriptor::new("my-bucket", "sample.pdf").unwrap();
        let req = template(Some("worker")).request_for(&job, None);

        let overrides = req.container_overrides.unwrap();
        assert_eq!(overrides.container_name, "worker");
        assert!(
            overrides
                .environment
                .contains(&(SOURCE_BUCKET_ENV.to_string(), "my-bucket".to_string()))
        );
        assert!(
            overrides
                .environment
                .contains(&(OBJECT_KEY_ENV.to_string(), "sample.pdf".to_string()))
        );
    }

    #[test]
    fn test_parse_public_ip_policy() {
        assert_eq!(
            "enabled".parse::<AssignPublicIp>(),
            Ok(AssignPublicIp::Enabled)
        );
        assert_eq!(
            "DISABLED".parse::<AssignPublicIp>(),
            Ok(AssignPublicIp::Disabled)
        );
        assert!("maybe".parse::<AssignPublicIp>().is_err());
    }

    #[test]
    fn test_parse_launch_type() {
        assert_eq!("fargate".parse::<LaunchType>(), Ok(LaunchType::Fargate));
        assert_eq!(
            "FARGATE_SPOT".parse::<LaunchType>(),
            Ok(LaunchType::FargateSpot)
        );
        assert!("LAMBDA".parse::<LaunchType>().is_err());
    }
}
