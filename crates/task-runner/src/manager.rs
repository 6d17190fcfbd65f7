use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::TaskError;
use crate::runner::TaskRunner;
use crate::types::{TaskResult, TaskStatus};

/// Named registry of runners with a cap on how many execute at once.
pub struct TaskExecutorManager {
    runners: DashMap<String, Arc<TaskRunner>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl TaskExecutorManager {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            runners: DashMap::new(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Registers `runner` under `name`, returning the runner it replaced.
    pub fn register_executor(
        &self,
        name: impl Into<String>,
        runner: Arc<TaskRunner>,
    ) -> Option<Arc<TaskRunner>> {
        let name = name.into();
        debug!(task = %name, "executor registered");
        self.runners.insert(name, runner)
    }

    pub fn unregister_executor(&self, name: &str) -> Option<Arc<TaskRunner>> {
        self.runners.remove(name).map(|(_, runner)| runner)
    }

    pub fn get(&self, name: &str) -> Option<Arc<TaskRunner>> {
        self.runners.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.runners.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> Result<Arc<TaskRunner>, TaskError> {
        self.get(name)
            .ok_or_else(|| TaskError::NotRegistered(name.to_string()))
    }

    /// Executes the named runner once a concurrency slot is free.
    pub async fn execute_task(&self, name: &str) -> Result<TaskResult, TaskError> {
        let runner = self.lookup(name)?;
        run_with_permit(Arc::clone(&self.permits), runner).await
    }

    /// Schedules the named runner in the background. Unknown names fail
    /// here, before anything is spawned.
    pub fn queue_task(
        &self,
        name: &str,
    ) -> Result<JoinHandle<Result<TaskResult, TaskError>>, TaskError> {
        let runner = self.lookup(name)?;
        if self.permits.is_closed() {
            return Err(TaskError::ManagerClosed);
        }
        info!(task = %name, "task queued");
        Ok(tokio::spawn(run_with_permit(Arc::clone(&self.permits), runner)))
    }

    /// Cancels the named runner. Unknown names are ignored.
    pub fn cancel_task(&self, name: &str) -> bool {
        self.get(name).is_some_and(|runner| runner.cancel())
    }

    /// Cancels every running task and returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.runners
            .iter()
            .filter(|entry| entry.value().cancel())
            .count()
    }

    pub fn get_all_task_status(&self) -> BTreeMap<String, TaskStatus> {
        self.runners
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Stops accepting work and cancels whatever is running.
    pub fn shutdown(&self) -> usize {
        self.permits.close();
        self.cancel_all()
    }
}

async fn run_with_permit(
    permits: Arc<Semaphore>,
    runner: Arc<TaskRunner>,
) -> Result<TaskResult, TaskError> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| TaskError::ManagerClosed)?;
    runner.execute().await
}
