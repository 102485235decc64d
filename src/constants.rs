//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group for the ServiceInstance and ServiceBinding resources
pub const API_GROUP: &str = "service-broker.octopilot.io";

/// Finalizer that holds deletion until the broker confirms cleanup
pub const FINALIZER: &str = "service-broker.octopilot.io/finalizer";

/// Annotation that forces one new attempt after a permanent failure
pub const RETRY_ANNOTATION: &str = "service-broker.octopilot.io/reconcile";

/// Field manager / label value used for objects written by the controller
pub const FIELD_MANAGER: &str = "service-broker-controller";

/// Name of the broker credentials secret (management namespace or override)
pub const BROKER_SECRET_NAME: &str = "service-broker-operator";

/// Default namespace holding the broker credentials secret
pub const DEFAULT_MANAGEMENT_NAMESPACE: &str = "service-broker-system";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Minimum spacing between two polls of the same broker operation (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Requeue interval while a resource is blocked (seconds)
/// Blocking conditions resolve externally, so this is cheap fixed polling
pub const DEFAULT_BLOCKED_REQUEUE_SECS: u64 = 10;

/// Resync interval for converged resources (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;

/// Maximum age of an in-flight broker operation before it is failed (seconds)
pub const DEFAULT_OPERATION_MAX_AGE_SECS: u64 = 3 * 60 * 60;

/// Default exponential backoff starting value for transient errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 5_000;

/// Default exponential backoff maximum value for transient errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Timeout applied to every broker and token request (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of reconciliations running in parallel per resource kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Number of conditions retained in a resource status
pub const MAX_CONDITIONS: usize = 8;
