//! System-wide constants and defaults.

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "apphost";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "apphost";

/// Manifest file looked up when none is given on the command line.
pub const DEFAULT_MANIFEST: &str = "apphost.yaml";

/// Scheme assigned to an endpoint when the manifest does not name one.
pub const DEFAULT_SCHEME: &str = "http";

/// Host assigned to an endpoint when the manifest does not name one.
pub const DEFAULT_HOST: &str = "localhost";

/// How long a launcher waits for a resource to accept connections.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// Delay between two readiness probes of a starting resource.
pub const DEFAULT_READINESS_POLL_MS: u64 = 100;

/// Delay between two liveness sweeps once everything is running.
pub const DEFAULT_SUPERVISE_INTERVAL_MS: u64 = 1_000;

/// Buffered resource events per subscriber before lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Environment variable carrying a resource's own listening port.
pub const PORT_ENV_VAR: &str = "PORT";
