/// Batching of incomplete tasks into array job elements
pub mod batch;
/// Completion checks against declared task outputs
pub mod checker;
/// Cluster specific submit scripts with fixed names
pub mod cluster;
/// Job settings loaded from YAML
pub mod config;
/// Sectioned job configurations (INI or in-memory)
pub mod job;
/// Scheduler abstraction over SLURM, SGE and PBS
pub mod scheduler;
/// Resource usage accounting from task logs
pub mod stats;
/// Human readable job summaries
pub mod summary;


pub use batch::{BatchError, BatchedTasksListGenerator};
pub use checker::{MergeTaskDependencies, Readiness, TaskChecker, TaskRole};
pub use cluster::{Cluster, ClusterFactory, ClusterKind};
pub use config::{ConfigErrors, JobSettings};
pub use job::{IniJobConfig, JobConfig, MemoryJobConfig};
pub use scheduler::{Backend, ScriptError, ScriptRequest, Scheduler, SchedulerFactory};
pub use stats::{ResourceUsage, TaskStats};
pub use summary::{ImageStatsSummary, TaskSummary, TaskSummaryFactory};
