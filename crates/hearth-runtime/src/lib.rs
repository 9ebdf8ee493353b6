//! # hearth-runtime
//!
//! Container runtime layer for Hearth VPS instances.
//! Provides a typed abstraction over the Docker Engine API (via bollard).
//!
//! ## Quick Start
//!
//! ```no_run
//! use hearth_runtime::{ContainerSpec, DockerRuntime, RuntimeAdapter};
//!
//! # async fn example() -> hearth_runtime::Result<()> {
//! let runtime = DockerRuntime::connect()?;
//!
//! let spec = ContainerSpec::builder("hearth-vps:latest", "vps-alice-vps")
//!     .memory_bytes(2 * 1024 * 1024 * 1024)
//!     .cpu_cores(2)
//!     .label("vps.hostname", "alice-vps")
//!     .build()?;
//!
//! let container = runtime.create(&spec).await?;
//! runtime.start(&container.name).await?;
//! let port = runtime.host_port(&container.name, 22).await?;
//! println!("ssh published on {port:?}");
//!
//! runtime.remove(&container.name, true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Lifecycle**: create, start, stop, restart, force-remove
//! - **Inspection**: host port lookup and one-shot stats counters
//! - **Exec**: streamed command output inside a running container
//! - **Archives**: filesystem export/import for backup and restore
//! - **No retries**: every call maps to exactly one daemon request sequence

mod adapter;
mod docker;
mod error;
mod spec;

pub use adapter::{ContainerRef, ExecStream, RuntimeAdapter, RuntimeStats};
pub use docker::{DockerRuntime, DEFAULT_STOP_TIMEOUT};
pub use error::{Result, RuntimeError};
pub use spec::{ContainerSpec, ContainerSpecBuilder, RestartPolicy, CPU_PERIOD};
