//! Local process launcher.
//!
//! Runs every resource as a child process of the host. Dependencies'
//! endpoints are injected as environment variables, and a resource counts
//! as ready once its port accepts TCP connections while its process is
//! still alive. A port that is already taken before the spawn is refused.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use apphost_common::config::AppHostConfig;
use apphost_common::constants;
use apphost_common::error::LaunchError;
use apphost_common::types::Endpoint;
use apphost_compose::graph::Resource;
use apphost_compose::manifest::LaunchSpec;
use apphost_compose::resolver::ResolvedConfiguration;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::launcher::ResourceLauncher;

/// Launches resources as local processes described by [`LaunchSpec`]s.
#[derive(Debug)]
pub struct ProcessLauncher {
    specs: HashMap<String, LaunchSpec>,
    children: Mutex<HashMap<String, Child>>,
    startup_timeout: Duration,
    readiness_poll: Duration,
}

impl ProcessLauncher {
    /// Creates a launcher with default timings.
    #[must_use]
    pub fn new(specs: HashMap<String, LaunchSpec>) -> Self {
        Self::from_config(specs, &AppHostConfig::default())
    }

    /// Creates a launcher using the timings of `config`.
    #[must_use]
    pub fn from_config(specs: HashMap<String, LaunchSpec>, config: &AppHostConfig) -> Self {
        Self {
            specs,
            children: Mutex::new(HashMap::new()),
            startup_timeout: config.startup_timeout(),
            readiness_poll: config.readiness_poll(),
        }
    }

    /// Sets how long a resource may take to accept connections.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the delay between readiness probes.
    #[must_use]
    pub const fn with_readiness_poll(mut self, poll: Duration) -> Self {
        self.readiness_poll = poll;
        self
    }

    /// Whether something already accepts connections on the spec's port.
    async fn port_taken(&self, spec: &LaunchSpec) -> bool {
        let probe = TcpStream::connect((spec.host.as_str(), spec.port));
        matches!(tokio::time::timeout(self.readiness_poll, probe).await, Ok(Ok(_)))
    }

    async fn wait_ready(
        &self,
        name: &str,
        spec: &LaunchSpec,
        child: &mut Child,
    ) -> Result<(), LaunchError> {
        let deadline = Instant::now() + self.startup_timeout;
        loop {
            ensure_running(name, child)?;

            if self.port_taken(spec).await {
                // The listener only counts if our child is still there to own it.
                ensure_running(name, child)?;
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(LaunchError::NotReady {
                    resource: name.to_owned(),
                    timeout_ms: u64::try_from(self.startup_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(self.readiness_poll).await;
        }
    }
}

fn ensure_running(name: &str, child: &mut Child) -> Result<(), LaunchError> {
    let exited = child.try_wait().map_err(|e| LaunchError::Status {
        resource: name.to_owned(),
        source: e,
    })?;
    match exited {
        Some(status) => Err(LaunchError::Exited {
            resource: name.to_owned(),
            status: status.to_string(),
        }),
        None => Ok(()),
    }
}

fn build_command(
    name: &str,
    spec: &LaunchSpec,
    config: &ResolvedConfiguration,
) -> Result<Command, LaunchError> {
    let Some((program, args)) = spec.command.split_first() else {
        return Err(LaunchError::Spawn {
            resource: name.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let mut command = Command::new(program);
    let _ = command
        .args(args)
        .envs(&spec.env)
        .envs(config.env_vars())
        .env(constants::PORT_ENV_VAR, spec.port.to_string())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        let _ = command.current_dir(dir);
    }
    Ok(command)
}

#[async_trait]
impl ResourceLauncher for ProcessLauncher {
    async fn start(
        &self,
        resource: &Resource,
        config: &ResolvedConfiguration,
    ) -> Result<Endpoint, LaunchError> {
        let name = resource.name();
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| LaunchError::MissingLaunchSpec {
                resource: name.to_owned(),
            })?;

        if self.port_taken(spec).await {
            return Err(LaunchError::PortInUse {
                resource: name.to_owned(),
                port: spec.port,
            });
        }

        let mut child = build_command(name, spec, config)?
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                resource: name.to_owned(),
                source: e,
            })?;
        tracing::info!(resource = %name, pid = child.id(), "process spawned");

        if let Err(e) = self.wait_ready(name, spec, &mut child).await {
            let _ = child.kill().await;
            return Err(e);
        }

        let _ = self.children.lock().await.insert(name.to_owned(), child);
        Ok(Endpoint::new(&spec.scheme, &spec.host, spec.port))
    }

    async fn stop(&self, resource: &Resource) -> Result<(), LaunchError> {
        let name = resource.name();
        let Some(mut child) = self.children.lock().await.remove(name) else {
            tracing::debug!(resource = %name, "no process to stop");
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(resource = %name, %status, "process already exited");
            return Ok(());
        }

        child.kill().await.map_err(|e| LaunchError::Stop {
            resource: name.to_owned(),
            source: e,
        })?;
        tracing::info!(resource = %name, "process stopped");
        Ok(())
    }

    async fn is_alive(&self, resource: &Resource) -> bool {
        let mut children = self.children.lock().await;
        children
            .get_mut(resource.name())
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }
}
