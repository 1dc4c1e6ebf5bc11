//! ECS task launcher
//!
//! Starts one task per request with `RunTask`. The idempotency token is
//! passed as the `clientToken`, so a redelivered job reuses the task ECS
//! already started for it.

use async_trait::async_trait;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ecs::operation::run_task::RunTaskError;
use aws_sdk_ecs::types::{
    AssignPublicIp as EcsAssignPublicIp, AwsVpcConfiguration, CapacityProviderStrategyItem,
    ContainerOverride, Failure, KeyValuePair, LaunchType as EcsLaunchType, NetworkConfiguration,
    TaskOverride,
};
use ferry_core::domain::launch::{AssignPublicIp, LaunchRequest, LaunchType, TaskHandle};
use tracing::{debug, warn};

use crate::error::LaunchError;
use crate::launcher::TaskLauncher;

/// Value of `startedBy` on every task this launcher starts
pub const STARTED_BY: &str = "ferry";

/// Task launcher talking to ECS
#[derive(Debug, Clone)]
pub struct EcsLauncher {
    client: Client,
}

impl EcsLauncher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a launcher using the default AWS configuration chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config))
    }
}

/// Spot capacity is requested through a capacity provider strategy rather
/// than a launch type
fn fargate_spot_strategy() -> Result<CapacityProviderStrategyItem, LaunchError> {
    CapacityProviderStrategyItem::builder()
        .capacity_provider("FARGATE_SPOT")
        .weight(1)
        .build()
        .map_err(|e| LaunchError::fatal(format!("invalid capacity provider strategy: {}", e)))
}

fn network_configuration(request: &LaunchRequest) -> Result<NetworkConfiguration, LaunchError> {
    let public_ip = match request.network.assign_public_ip {
        AssignPublicIp::Enabled => EcsAssignPublicIp::Enabled,
        AssignPublicIp::Disabled => EcsAssignPublicIp::Disabled,
    };

    let vpc = AwsVpcConfiguration::builder()
        .set_subnets(Some(request.network.subnets.clone()))
        .set_security_groups(Some(request.network.security_groups.clone()))
        .assign_public_ip(public_ip)
        .build()
        .map_err(|e| LaunchError::fatal(format!("invalid network configuration: {}", e)))?;

    Ok(NetworkConfiguration::builder()
        .awsvpc_configuration(vpc)
        .build())
}

fn task_override(request: &LaunchRequest) -> Option<TaskOverride> {
    let container = request.container_overrides.as_ref()?;

    let environment = container
        .environment
        .iter()
        .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
        .collect::<Vec<_>>();

    Some(
        TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&container.container_name)
                    .set_environment(Some(environment))
                    .build(),
            )
            .build(),
    )
}

/// Capacity-type placement failures clear up on their own
fn is_capacity_failure(reason: &str) -> bool {
    reason.starts_with("RESOURCE")
        || reason == "AGENT"
        || reason.to_ascii_lowercase().contains("capacity")
}

fn classify_failures(failures: &[Failure]) -> LaunchError {
    let reasons = failures
        .iter()
        .map(|f| {
            let reason = f.reason().unwrap_or("unknown");
            match f.detail() {
                Some(detail) => format!("{} ({})", reason, detail),
                None => reason.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let retryable = !failures.is_empty()
        && failures
            .iter()
            .all(|f| is_capacity_failure(f.reason().unwrap_or_default()));

    if retryable {
        LaunchError::retryable(reasons)
    } else if reasons.is_empty() {
        LaunchError::retryable("RunTask returned neither a task nor a failure")
    } else {
        LaunchError::fatal(reasons)
    }
}

fn classify_error(err: SdkError<RunTaskError>) -> LaunchError {
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            let throttled = service_err
                .code()
                .is_some_and(|code| code.contains("Throttl"));
            if service_err.is_server_exception() || throttled {
                LaunchError::retryable(detail)
            } else {
                LaunchError::fatal(detail)
            }
        }
        // Timeouts, connection failures and unparseable responses are transient
        _ => LaunchError::retryable(detail),
    }
}

#[async_trait]
impl TaskLauncher for EcsLauncher {
    async fn start_task(&self, request: &LaunchRequest) -> Result<TaskHandle, LaunchError> {
        let mut call = self
            .client
            .run_task()
            .cluster(&request.cluster)
            .task_definition(&request.task_definition)
            .count(1)
            .started_by(STARTED_BY)
            .network_configuration(network_configuration(request)?)
            .set_overrides(task_override(request));

        call = match request.launch_type {
            LaunchType::Fargate => call.launch_type(EcsLaunchType::Fargate),
            LaunchType::Ec2 => call.launch_type(EcsLaunchType::Ec2),
            LaunchType::FargateSpot => call.capacity_provider_strategy(fargate_spot_strategy()?),
        };

        if let Some(token) = &request.idempotency_token {
            call = call.client_token(token.as_str());
        }

        let output = call.send().await.map_err(classify_error)?;

        if let Some(task_arn) = output.tasks().iter().find_map(|task| task.task_arn()) {
            debug!("ECS started task {}", task_arn);
            return Ok(TaskHandle {
                task_id: task_arn.to_string(),
            });
        }

        let error = classify_failures(output.failures());
        warn!("ECS did not start a task: {}", error);
        Err(error)
    }

    fn supports_deduplication(&self) -> bool {
        true
    }
}
