//! Commit protocol for the surrounding batch job
//!
//! Every record put is durable in the stream as soon as the call returns, so
//! there is no staged output to promote or discard. The sink still has to
//! hand the job framework a commit strategy; [`NoOpCommitPolicy`] says
//! explicitly that no task-level commit is needed.

use crate::error::Result;

/// Identifies the job being committed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: String,
}

/// Identifies one attempt of one task of a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskContext {
    pub job_id: String,
    pub task_id: String,
    pub attempt: u32,
}

/// Commit hooks invoked by the job framework
///
/// Every hook defaults to doing nothing.
pub trait CommitPolicy: Send + Sync {
    fn setup_job(&self, _job: &JobContext) -> Result<()> {
        Ok(())
    }

    /// Whether [`CommitPolicy::commit_task`] must be called for a finished task
    fn needs_task_commit(&self, _task: &TaskContext) -> bool {
        false
    }

    fn setup_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn commit_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn abort_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }
}

/// Commit policy for sinks whose writes are durable immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCommitPolicy;

impl CommitPolicy for NoOpCommitPolicy {
    fn setup_job(&self, _job: &JobContext) -> Result<()> {
        Ok(())
    }

    fn needs_task_commit(&self, _task: &TaskContext) -> bool {
        false
    }

    fn setup_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn commit_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn abort_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }
}
