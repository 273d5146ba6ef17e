//! Fetpype Core: paths, mounts, and container execution
//!
//! Everything a pipeline stage needs around its command template: directory
//! resolution, bind mounts, a scoped execution context, the blocking
//! container executor, and the runner that ties a planned stage to it.
//!
//! # Invocation Flow
//!
//! ```text
//! Stage::plan → StageInvocation → ContainerExecutor → output check → StageOutcome
//!    ↓                ↓                  ↓                  ↓
//! Validated     PathsResolved        Executed     Succeeded | Failed
//!               + Rendered
//! ```

pub mod container;
pub mod context;
pub mod data_model;
pub mod error;
pub mod executor;
pub mod logging;
pub mod mount;
pub mod paths;
pub mod runner;
pub mod stage;

pub use container::{check_container_images, container_image, ContainerKind, ImageCheck};
pub use context::ExecutionContext;
pub use data_model::{DeclaredOutput, ExecResult, PathGroup, StageInvocation};
pub use error::{FetpypeError, Result};
pub use executor::{check_outputs_exist, ContainerExecutor};
pub use logging::{init_logging, LogOptions};
pub use mount::{build_mount_arg, MountSpec};
pub use paths::{common_path, resolve_directory};
pub use runner::{InvocationRecord, StageOutcome, StageRunner};
pub use stage::{Stage, StageKind, StagePlan, StageState};

/// Engine version recorded in every invocation record
pub const FETPYPE_VERSION: &str = env!("CARGO_PKG_VERSION");
