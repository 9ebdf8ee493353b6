//! Deterministic in-memory runtime for tests.

use crate::usage::DISK_PROBE_COMMAND;
use async_trait::async_trait;
use futures::stream;
use hearth_runtime::{
    ContainerRef, ContainerSpec, ExecStream, Result, RuntimeAdapter, RuntimeError, RuntimeStats,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Runtime operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOp {
    Create,
    Start,
    Stop,
    Restart,
    Remove,
    HostPort,
    Stats,
    Exec,
    Export,
    Import,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    spec: ContainerSpec,
    running: bool,
    port: Option<u16>,
}

struct State {
    containers: HashMap<String, FakeContainer>,
    failures: Vec<(FakeOp, Option<String>)>,
    created: u32,
    next_port: u16,
    assign_ports: bool,
    stats: RuntimeStats,
    disk_output: Option<String>,
    disk_hang: bool,
    session_output: Vec<String>,
    session_hang: bool,
    session_stream_error: bool,
    imports: Vec<(String, PathBuf)>,
}

/// Fake runtime keeping containers in a map.
///
/// Exec against an unknown container is allowed so the session
/// bootstrapper can be exercised without a create.
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                containers: HashMap::new(),
                failures: Vec::new(),
                created: 0,
                next_port: 40000,
                assign_ports: true,
                stats: RuntimeStats {
                    cpu_total_usage: 300_000_000,
                    precpu_total_usage: 100_000_000,
                    system_cpu_usage: 3_000_000_000,
                    presystem_cpu_usage: 1_000_000_000,
                    online_cpus: 4,
                    memory_usage: 256 * 1024 * 1024,
                    memory_limit: 1024 * 1024 * 1024,
                },
                disk_output: Some(
                    "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                     overlay 61255492 9512340 48601904 17% /\n"
                        .to_string(),
                ),
                disk_hang: false,
                session_output: vec!["ssh session: ssh fake@tmate.local\r\n".to_string()],
                session_hang: false,
                session_stream_error: false,
                imports: Vec::new(),
            }),
        }
    }

    /// Make `op` fail, for one container or (with `None`) for all.
    pub fn fail(&self, op: FakeOp, container: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((op, container.map(str::to_string)));
    }

    /// Whether new containers get a published port.
    pub fn set_assign_ports(&self, assign: bool) {
        self.state.lock().unwrap().assign_ports = assign;
    }

    pub fn set_stats(&self, stats: RuntimeStats) {
        self.state.lock().unwrap().stats = stats;
    }

    /// Output of the disk probe; `None` makes the probe fail.
    pub fn set_disk_output(&self, output: Option<&str>) {
        self.state.lock().unwrap().disk_output = output.map(str::to_string);
    }

    /// Disk probe never yields.
    pub fn set_disk_hang(&self, hang: bool) {
        self.state.lock().unwrap().disk_hang = hang;
    }

    pub fn set_session_output(&self, chunks: Vec<String>) {
        self.state.lock().unwrap().session_output = chunks;
    }

    /// Session stream never yields.
    pub fn set_session_hang(&self, hang: bool) {
        self.state.lock().unwrap().session_hang = hang;
    }

    /// Session stream yields an error item.
    pub fn set_session_stream_error(&self, error: bool) {
        self.state.lock().unwrap().session_stream_error = error;
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .is_some_and(|c| c.running)
    }

    pub fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.spec.clone())
    }

    /// Archives imported so far, as `(container, archive)`.
    pub fn imports(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().unwrap().imports.clone()
    }

    fn check(&self, op: FakeOp, container: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        let injected = state
            .failures
            .iter()
            .any(|(o, c)| *o == op && c.as_deref().map_or(true, |c| c == container));
        if injected {
            return Err(RuntimeError::Exec(format!("injected {op:?} failure for {container}")));
        }
        Ok(())
    }

    fn with_container<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut FakeContainer) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        f(container)
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerRef> {
        self.check(FakeOp::Create, &spec.name)?;
        spec.validate()?;
        let mut state = self.state.lock().unwrap();
        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict(spec.name.clone()));
        }
        state.created += 1;
        let id = format!("fake-{}", state.created);
        let port = if state.assign_ports {
            state.next_port += 1;
            Some(state.next_port - 1)
        } else {
            None
        };
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
                port,
            },
        );
        Ok(ContainerRef {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, container: &str) -> Result<()> {
        self.check(FakeOp::Start, container)?;
        self.with_container(container, |c| {
            c.running = true;
            Ok(())
        })
    }

    async fn stop(&self, container: &str) -> Result<()> {
        self.check(FakeOp::Stop, container)?;
        self.with_container(container, |c| {
            c.running = false;
            Ok(())
        })
    }

    async fn restart(&self, container: &str) -> Result<()> {
        self.check(FakeOp::Restart, container)?;
        self.with_container(container, |c| {
            c.running = true;
            Ok(())
        })
    }

    async fn remove(&self, container: &str, force: bool) -> Result<()> {
        self.check(FakeOp::Remove, container)?;
        let mut state = self.state.lock().unwrap();
        match state.containers.get(container) {
            None => Err(RuntimeError::NotFound(container.to_string())),
            Some(c) if c.running && !force => Err(RuntimeError::Exec(format!(
                "container {} ({}) is running",
                container, c.id
            ))),
            Some(_) => {
                state.containers.remove(container);
                Ok(())
            }
        }
    }

    async fn host_port(&self, container: &str, guest_port: u16) -> Result<Option<u16>> {
        self.check(FakeOp::HostPort, container)?;
        self.with_container(container, |c| {
            Ok(c.port.filter(|_| c.spec.guest_port == guest_port))
        })
    }

    async fn stats(&self, container: &str) -> Result<RuntimeStats> {
        self.check(FakeOp::Stats, container)?;
        let stats = self.state.lock().unwrap().stats;
        self.with_container(container, |_| Ok(stats))
    }

    async fn exec(&self, container: &str, cmd: &[String], _tty: bool) -> Result<ExecStream> {
        self.check(FakeOp::Exec, container)?;
        let state = self.state.lock().unwrap();
        if let Some(c) = state.containers.get(container) {
            if !c.running {
                return Err(RuntimeError::Exec(format!("container {container} is not running")));
            }
        }

        if cmd.iter().map(String::as_str).eq(DISK_PROBE_COMMAND) {
            if state.disk_hang {
                return Ok(Box::pin(stream::pending::<Result<String>>()));
            }
            return match &state.disk_output {
                Some(output) => {
                    let chunks: Vec<Result<String>> = vec![Ok(output.clone())];
                    Ok(Box::pin(stream::iter(chunks)))
                }
                None => Err(RuntimeError::Exec("df: not found".into())),
            };
        }

        if state.session_hang {
            return Ok(Box::pin(stream::pending::<Result<String>>()));
        }
        if state.session_stream_error {
            let chunks: Vec<Result<String>> = vec![
                Ok("tmate: connecting\n".to_string()),
                Err(RuntimeError::Exec("stream closed".into())),
            ];
            return Ok(Box::pin(stream::iter(chunks)));
        }
        let chunks: Vec<Result<String>> = state.session_output.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn export_filesystem(&self, container: &str, dest: &Path) -> Result<u64> {
        self.check(FakeOp::Export, container)?;
        let content = self.with_container(container, |c| Ok(format!("tar:{}:{}", c.id, c.spec.name)))?;
        std::fs::write(dest, content.as_bytes())?;
        Ok(content.len() as u64)
    }

    async fn import_filesystem(&self, container: &str, src: &Path) -> Result<()> {
        self.check(FakeOp::Import, container)?;
        std::fs::metadata(src)?;
        self.with_container(container, |_| Ok(()))?;
        self.state
            .lock()
            .unwrap()
            .imports
            .push((container.to_string(), src.to_path_buf()));
        Ok(())
    }
}
