//! Command/query dispatch with role-based authorization
//!
//! The operation table is static and built once at startup. Authorization
//! runs before the handler: when the invoker's role set does not intersect
//! the operation's required roles, the handler is never invoked and no side
//! effects occur. Handler results are wrapped into the uniform response
//! envelope; the distinguished storage-timeout condition is re-raised
//! instead so upstream retry logic can see it.

use crate::error::CrudError;
use crate::handlers::VehicleService;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Roles allowed to run queries
pub const READ_ROLES: &[&str] = &["VEHICLES_READ"];
/// Roles allowed to run mutations, including generation start/stop
pub const WRITE_ROLES: &[&str] = &["VEHICLES_WRITE"];

// Operation names are the gateway protocol constants.
pub const VEHICLES_LISTING: &str = "emigateway.graphql.query.GeneratorVehiclesListing";
pub const VEHICLES_GET: &str = "emigateway.graphql.query.GeneratorVehicles";
pub const VEHICLES_CREATE: &str = "emigateway.graphql.mutation.GeneratorCreateVehicles";
pub const VEHICLES_UPDATE: &str = "emigateway.graphql.mutation.GeneratorUpdateVehicles";
pub const VEHICLES_DELETE: &str = "emigateway.graphql.mutation.GeneratorDeleteVehicless";
pub const GENERATION_START: &str = "emigateway.graphql.mutation.GeneratorStartVehicleGeneration";
pub const GENERATION_STOP: &str = "emigateway.graphql.mutation.GeneratorStopVehicleGeneration";

/// Identity attached to every dispatched operation by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoker {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// One command/query produced by the gateway; consumed, never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub operation_name: String,
    #[serde(default)]
    pub args: Value,
    pub invoker: Invoker,
}

/// Uniform success/error envelope returned for every operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CqrsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseResult {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub name: String,
    pub msg: String,
}

impl CqrsResponse {
    pub fn success(data: Value) -> Self {
        Self {
            data: Some(data),
            result: ResponseResult {
                code: 200,
                error: None,
            },
        }
    }

    pub fn from_error(err: &CrudError) -> Self {
        Self {
            data: None,
            result: ResponseResult {
                code: err.code(),
                error: Some(ResponseError {
                    name: err.name().to_string(),
                    msg: err.public_message(),
                }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.error.is_none()
    }
}

/// Failures that escape the uniform envelope
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Integration error: the gateway sent an operation this service does
    /// not expose
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Transient storage failure, re-raised for upstream retry
    #[error("storage timeout: {0}")]
    StorageTimeout(String),
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, CrudError>> + Send>>;
type HandlerFn = fn(Arc<VehicleService>, RequestEnvelope) -> HandlerFuture;

struct OperationEntry {
    required_roles: &'static [&'static str],
    handler: HandlerFn,
}

fn operation_table() -> HashMap<&'static str, OperationEntry> {
    let mut table: HashMap<&'static str, OperationEntry> = HashMap::new();

    table.insert(
        VEHICLES_LISTING,
        OperationEntry {
            required_roles: READ_ROLES,
            handler: |service, envelope| {
                Box::pin(async move { service.vehicles_listing(envelope.args).await })
            },
        },
    );
    table.insert(
        VEHICLES_GET,
        OperationEntry {
            required_roles: READ_ROLES,
            handler: |service, envelope| {
                Box::pin(async move { service.vehicle_by_id(envelope.args).await })
            },
        },
    );
    table.insert(
        VEHICLES_CREATE,
        OperationEntry {
            required_roles: WRITE_ROLES,
            handler: |service, envelope| {
                Box::pin(async move {
                    service.create_vehicle(envelope.args, &envelope.invoker).await
                })
            },
        },
    );
    table.insert(
        VEHICLES_UPDATE,
        OperationEntry {
            required_roles: WRITE_ROLES,
            handler: |service, envelope| {
                Box::pin(async move {
                    service.update_vehicle(envelope.args, &envelope.invoker).await
                })
            },
        },
    );
    table.insert(
        VEHICLES_DELETE,
        OperationEntry {
            required_roles: WRITE_ROLES,
            handler: |service, envelope| {
                Box::pin(async move {
                    service.delete_vehicles(envelope.args, &envelope.invoker).await
                })
            },
        },
    );
    table.insert(
        GENERATION_START,
        OperationEntry {
            required_roles: WRITE_ROLES,
            handler: |service, _envelope| {
                Box::pin(async move { service.start_generation().await })
            },
        },
    );
    table.insert(
        GENERATION_STOP,
        OperationEntry {
            required_roles: WRITE_ROLES,
            handler: |service, _envelope| {
                Box::pin(async move { service.stop_generation().await })
            },
        },
    );

    table
}

/// Maps operation names to handlers and authorizes every invocation
pub struct Dispatcher {
    service: Arc<VehicleService>,
    table: HashMap<&'static str, OperationEntry>,
}

impl Dispatcher {
    pub fn new(service: Arc<VehicleService>) -> Self {
        Self {
            service,
            table: operation_table(),
        }
    }

    pub async fn dispatch(
        &self,
        envelope: RequestEnvelope,
    ) -> Result<CqrsResponse, DispatchError> {
        let Some(entry) = self.table.get(envelope.operation_name.as_str()) else {
            return Err(DispatchError::UnknownOperation(envelope.operation_name));
        };

        let authorized = entry
            .required_roles
            .iter()
            .any(|required| envelope.invoker.roles.iter().any(|role| role == required));
        if !authorized {
            let err = CrudError::PermissionDenied {
                operation: envelope.operation_name.clone(),
                required: entry.required_roles,
            };
            tracing::warn!(
                operation = %envelope.operation_name,
                invoker = %envelope.invoker.username,
                "operation denied"
            );
            return Ok(CqrsResponse::from_error(&err));
        }

        let operation_name = envelope.operation_name.clone();
        match (entry.handler)(self.service.clone(), envelope).await {
            Ok(data) => Ok(CqrsResponse::success(data)),
            Err(CrudError::StorageTimeout(msg)) => {
                tracing::warn!(operation = %operation_name, "storage timeout re-raised");
                Err(DispatchError::StorageTimeout(msg))
            }
            Err(err) => {
                tracing::warn!(operation = %operation_name, error = %err, "operation failed");
                Ok(CqrsResponse::from_error(&err))
            }
        }
    }
}
