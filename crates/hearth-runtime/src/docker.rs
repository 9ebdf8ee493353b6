//! Docker implementation of [`RuntimeAdapter`] using bollard.

use crate::adapter::{ContainerRef, ExecStream, RuntimeAdapter, RuntimeStats};
use crate::error::{Result, RuntimeError};
use crate::spec::{ContainerSpec, RestartPolicy};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{HostConfig, PortBinding, RestartPolicyNameEnum};
use bollard::Docker;
use bytes::Bytes;
use futures::{future, Stream, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Grace period given to a container before the daemon kills it on stop/restart.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Container runtime backed by a Docker daemon.
///
/// The underlying client is cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    stop_timeout: Duration,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the platform socket).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::from_client(docker))
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self {
            docker,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Set the grace period used by stop and restart.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Check that the daemon is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    fn stop_secs(&self) -> i64 {
        i64::try_from(self.stop_timeout.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Map daemon errors for `container` into typed runtime errors.
fn classify(container: &str, err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container.to_string()),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409, ..
        } => RuntimeError::Conflict(container.to_string()),
        other => RuntimeError::Api(other),
    }
}

/// Treat "304 Not Modified" (already in the requested state) as success.
fn ignore_not_modified(container: &str, result: std::result::Result<(), bollard::errors::Error>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => {
            tracing::debug!(container = %container, "Container already in requested state");
            Ok(())
        }
        Err(e) => Err(classify(container, e)),
    }
}

/// Stream an archive file in chunks, parking the first read error in `error`.
fn archive_body(
    file: tokio::fs::File,
    error: Arc<Mutex<Option<std::io::Error>>>,
) -> impl Stream<Item = Bytes> + Send + 'static {
    ReaderStream::new(file).scan(error, |error, chunk| {
        future::ready(match chunk {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                if let Ok(mut slot) = error.lock() {
                    *slot = Some(e);
                }
                None
            }
        })
    })
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    }
}

fn log_output_text(output: LogOutput) -> String {
    let message = match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message,
    };
    String::from_utf8_lossy(&message).into_owned()
}

#[async_trait]
impl RuntimeAdapter for DockerRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerRef> {
        spec.validate()?;
        let port_key = spec.port_key();
        tracing::debug!(
            container = %spec.name,
            image = %spec.image,
            memory_bytes = spec.memory_bytes,
            cpu_quota = spec.cpu_quota,
            "Creating container"
        );

        let memory = i64::try_from(spec.memory_bytes)
            .map_err(|_| RuntimeError::InvalidSpec("memory limit out of range".into()))?;

        let host_config = HostConfig {
            memory: Some(memory),
            cpu_quota: Some(spec.cpu_quota),
            cpu_period: Some(crate::spec::CPU_PERIOD),
            port_bindings: Some(HashMap::from([(
                port_key.clone(),
                // Empty binding: the daemon picks a free host port.
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            )])),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(restart_policy_name(spec.restart_policy)),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            tty: Some(spec.interactive),
            open_stdin: Some(spec.interactive),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| classify(&spec.name, e))?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "Daemon warning on create");
        }
        tracing::info!(container = %spec.name, id = %response.id, "Container created");

        Ok(ContainerRef {
            id: response.id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, container: &str) -> Result<()> {
        tracing::debug!(container = %container, "Starting container");
        let result = self
            .docker
            .start_container(container, None::<StartContainerOptions<String>>)
            .await;
        ignore_not_modified(container, result)
    }

    async fn stop(&self, container: &str) -> Result<()> {
        tracing::debug!(container = %container, "Stopping container");
        let result = self
            .docker
            .stop_container(container, Some(StopContainerOptions { t: self.stop_secs() }))
            .await;
        ignore_not_modified(container, result)
    }

    async fn restart(&self, container: &str) -> Result<()> {
        tracing::debug!(container = %container, "Restarting container");
        let t = isize::try_from(self.stop_secs()).unwrap_or(isize::MAX);
        self.docker
            .restart_container(container, Some(RestartContainerOptions { t }))
            .await
            .map_err(|e| classify(container, e))
    }

    async fn remove(&self, container: &str, force: bool) -> Result<()> {
        tracing::debug!(container = %container, force, "Removing container");
        self.docker
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| classify(container, e))
    }

    async fn host_port(&self, container: &str, guest_port: u16) -> Result<Option<u16>> {
        let info = self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
            .map_err(|e| classify(container, e))?;

        let key = format!("{guest_port}/tcp");
        let port = info
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|mut ports| ports.remove(&key))
            .flatten()
            .and_then(|bindings| {
                bindings
                    .into_iter()
                    .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()))
            });

        tracing::debug!(container = %container, guest_port, host_port = ?port, "Resolved host port");
        Ok(port)
    }

    async fn stats(&self, container: &str) -> Result<RuntimeStats> {
        let mut stream = Box::pin(self.docker.stats(
            container,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        ));

        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => return Err(classify(container, e)),
            None => {
                return Err(RuntimeError::Exec(format!(
                    "stats stream for {container} ended without a sample"
                )))
            }
        };

        let online_cpus = stats
            .cpu_stats
            .online_cpus
            .filter(|n| *n > 0)
            .or_else(|| {
                stats
                    .cpu_stats
                    .cpu_usage
                    .percpu_usage
                    .as_ref()
                    .map(|v| v.len() as u64)
            })
            .unwrap_or(1);

        Ok(RuntimeStats {
            cpu_total_usage: stats.cpu_stats.cpu_usage.total_usage,
            precpu_total_usage: stats.precpu_stats.cpu_usage.total_usage,
            system_cpu_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            presystem_cpu_usage: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpus: u32::try_from(online_cpus).unwrap_or(u32::MAX),
            memory_usage: stats.memory_stats.usage.unwrap_or(0),
            memory_limit: stats.memory_stats.limit.unwrap_or(0),
        })
    }

    async fn exec(&self, container: &str, cmd: &[String], tty: bool) -> Result<ExecStream> {
        tracing::debug!(container = %container, cmd = ?cmd, tty, "Creating exec");
        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(tty),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| classify(container, e))?;

        let started = self
            .docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    tty,
                    output_capacity: None,
                }),
            )
            .await
            .map_err(|e| classify(container, e))?;

        match started {
            StartExecResults::Attached { output, .. } => {
                let stream = output.map(|item| item.map(log_output_text).map_err(RuntimeError::Api));
                Ok(Box::pin(stream))
            }
            StartExecResults::Detached => Err(RuntimeError::Exec(format!(
                "exec {} in {container} started detached",
                exec.id
            ))),
        }
    }

    async fn export_filesystem(&self, container: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::debug!(container = %container, dest = %dest.display(), "Exporting filesystem");

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = Box::pin(self.docker.export_container(container));
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(container, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;

        tracing::info!(container = %container, bytes = written, "Filesystem exported");
        Ok(written)
    }

    async fn import_filesystem(&self, container: &str, src: &Path) -> Result<()> {
        tracing::debug!(container = %container, src = %src.display(), "Importing filesystem");
        let file = tokio::fs::File::open(src).await?;
        let size = file.metadata().await?.len();

        let read_error = Arc::new(Mutex::new(None));
        self.docker
            .upload_to_container_streaming(
                container,
                Some(UploadToContainerOptions {
                    path: "/".to_string(),
                    ..Default::default()
                }),
                archive_body(file, Arc::clone(&read_error)),
            )
            .await
            .map_err(|e| classify(container, e))?;

        // A read error ends the body early; the daemon only saw a truncated archive.
        if let Some(e) = read_error.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(e.into());
        }
        tracing::info!(container = %container, bytes = size, "Filesystem imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        let err = |status_code| bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: String::new(),
        };
        assert!(matches!(classify("vps-a", err(404)), RuntimeError::NotFound(_)));
        assert!(matches!(classify("vps-a", err(409)), RuntimeError::Conflict(_)));
        assert!(matches!(classify("vps-a", err(500)), RuntimeError::Api(_)));
    }

    #[tokio::test]
    async fn test_archive_body_streams_whole_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snap.tar");
        // Larger than one ReaderStream chunk.
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).expect("write archive");

        let file = tokio::fs::File::open(&path).await.expect("open");
        let error = Arc::new(Mutex::new(None));
        let chunks: Vec<Bytes> = archive_body(file, Arc::clone(&error)).collect().await;

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), content);
        assert!(error.lock().expect("lock").is_none());
    }
}
