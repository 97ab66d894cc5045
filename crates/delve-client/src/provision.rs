//! Dependency provisioning: make sure the container runtime and the
//! backend's dependent services are running before the first connect.
//!
//! Orchestration is abstracted behind the two primitives the session logic
//! actually needs — start a thing, and check whether it is alive — so any
//! orchestration backend can stand in for the default `docker compose`
//! implementation. Every wait loop here is bounded; the worst-case latency
//! of [`Provisioner::ensure_ready`] is computable from configuration alone.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

use delve_core::config::{ProvisionConfig, ServiceSpec};
use delve_core::errors::ProvisionError;

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator trait
// ─────────────────────────────────────────────────────────────────────────────

/// The two start/check primitives provisioning is built on.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Whether the container runtime answers at all.
    async fn runtime_available(&self) -> bool;

    /// Ask the runtime to start. Readiness is observed by polling
    /// [`Orchestrator::runtime_available`] afterwards.
    async fn start_runtime(&self) -> Result<(), ProvisionError>;

    /// Names of the services currently running.
    async fn running_services(&self) -> Result<Vec<String>, ProvisionError>;

    /// Ask a service to start. Readiness is observed via its liveness probe.
    async fn start_service(&self, service: &ServiceSpec) -> Result<(), ProvisionError>;
}

/// Default orchestrator: `docker` / `docker compose` subprocesses.
pub struct DockerOrchestrator {
    runtime_start_command: Vec<String>,
}

impl DockerOrchestrator {
    /// Orchestrator whose runtime is started by `runtime_start_command`.
    #[must_use]
    pub fn new(runtime_start_command: Vec<String>) -> Self {
        Self {
            runtime_start_command,
        }
    }
}

#[async_trait]
impl Orchestrator for DockerOrchestrator {
    async fn runtime_available(&self) -> bool {
        Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn start_runtime(&self) -> Result<(), ProvisionError> {
        run_command(&self.runtime_start_command).await
    }

    async fn running_services(&self) -> Result<Vec<String>, ProvisionError> {
        let output = Command::new("docker")
            .args(["compose", "ps", "--services", "--filter", "status=running"])
            .output()
            .await
            .map_err(|error| ProvisionError::CommandFailed {
                command: "docker compose ps".into(),
                reason: error.to_string(),
            })?;
        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: "docker compose ps".into(),
                reason: format!("exited with {}", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    async fn start_service(&self, service: &ServiceSpec) -> Result<(), ProvisionError> {
        run_command(&service.start_command).await
    }
}

async fn run_command(argv: &[String]) -> Result<(), ProvisionError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ProvisionError::CommandFailed {
            command: String::new(),
            reason: "empty command".into(),
        });
    };
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|error| ProvisionError::CommandFailed {
            command: argv.join(" "),
            reason: error.to_string(),
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ProvisionError::CommandFailed {
            command: argv.join(" "),
            reason: format!("exited with {status}"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provisioner
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate readiness of the dependency set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Runtime and every declared service are live.
    Ready,
    /// Runtime is live; the named services never passed their probe.
    ///
    /// The session proceeds to connect anyway — the backend may still be
    /// reachable — but the caller is warned.
    PartiallyReady(Vec<String>),
}

/// Checks and starts the dependency set.
pub struct Provisioner {
    config: ProvisionConfig,
    orchestrator: Box<dyn Orchestrator>,
}

impl Provisioner {
    /// Provisioner using the default docker orchestrator.
    #[must_use]
    pub fn docker(config: ProvisionConfig) -> Self {
        let orchestrator = Box::new(DockerOrchestrator::new(
            config.runtime_start_command.clone(),
        ));
        Self {
            config,
            orchestrator,
        }
    }

    /// Provisioner with a custom orchestration backend.
    #[must_use]
    pub fn with_orchestrator(config: ProvisionConfig, orchestrator: Box<dyn Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Ensure the runtime and dependent services are up.
    ///
    /// An unreachable runtime that will not start is fatal. A service that
    /// never passes its liveness probe is not: it is reported in
    /// [`Readiness::PartiallyReady`] and the session may still connect.
    pub async fn ensure_ready(&self) -> Result<Readiness, ProvisionError> {
        if self.orchestrator.runtime_available().await {
            debug!("container runtime already reachable");
        } else {
            info!("container runtime not reachable, starting it");
            self.orchestrator.start_runtime().await?;
            self.wait_for_runtime().await?;
        }

        let running = self.orchestrator.running_services().await?;
        let mut unready = Vec::new();
        for service in &self.config.services {
            if running.contains(&service.name) {
                debug!(service = %service.name, "dependent service already running");
                continue;
            }
            info!(service = %service.name, "starting dependent service");
            if let Err(error) = self.orchestrator.start_service(service).await {
                warn!(service = %service.name, %error, "service start command failed");
                unready.push(service.name.clone());
                continue;
            }
            if probe_until_live(service).await {
                info!(service = %service.name, "dependent service is live");
            } else {
                warn!(
                    service = %service.name,
                    attempts = service.probe_attempts,
                    addr = %service.probe_addr,
                    "dependent service never passed its liveness probe"
                );
                unready.push(service.name.clone());
            }
        }

        if unready.is_empty() {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::PartiallyReady(unready))
        }
    }

    async fn wait_for_runtime(&self) -> Result<(), ProvisionError> {
        for attempt in 1..=self.config.runtime_attempts {
            if self.orchestrator.runtime_available().await {
                info!(attempt, "container runtime is up");
                return Ok(());
            }
            debug!(
                attempt,
                of = self.config.runtime_attempts,
                "waiting for container runtime"
            );
            tokio::time::sleep(self.config.runtime_poll_interval()).await;
        }
        Err(ProvisionError::RuntimeUnavailable {
            attempts: self.config.runtime_attempts,
            reason: "runtime never answered after its start command".into(),
        })
    }
}

/// Poll a service's TCP liveness probe until it answers or the attempt cap
/// is spent.
async fn probe_until_live(service: &ServiceSpec) -> bool {
    for attempt in 1..=service.probe_attempts {
        if probe_once(&service.probe_addr, service.probe_interval()).await {
            return true;
        }
        debug!(
            service = %service.name,
            attempt,
            of = service.probe_attempts,
            "liveness probe not answering yet"
        );
        tokio::time::sleep(service.probe_interval()).await;
    }
    false
}

/// One connection attempt counts as liveness; the connection is dropped
/// immediately.
async fn probe_once(addr: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
