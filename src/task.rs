//! Task and registry abstractions.
//!
//! A [`Task`] is a named unit of build work: an ordered list of dependency
//! names plus an action closure. The [`TaskRegistry`] is an explicit value
//! built once by the entry point and handed to the scheduler by reference;
//! there is no ambient global registry.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::GraphError;

type ActionFn = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A named unit of build work. Immutable once registered.
pub struct Task {
    name: String,
    dependencies: Vec<String>,
    action: ActionFn,
}

impl Task {
    /// Creates a task with no dependencies and a no-op action. A task left
    /// that way is a pure aggregate: its only effect is running its
    /// dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            action: Box::new(|| Ok(())),
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn action<F>(mut self, func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.action = Box::new(func);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub(crate) fn execute(&self) -> anyhow::Result<()> {
        (self.action)()
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({}, deps: {:?})", self.name, self.dependencies)
    }
}

/// All registered tasks of a build, keyed by name. Read-only during
/// execution; a second run over the same registry re-executes everything.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
}

impl TaskRegistry {
    pub fn config() -> RegistryConfig {
        RegistryConfig { tasks: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A builder struct for creating a [`TaskRegistry`].
#[derive(Debug, Default)]
pub struct RegistryConfig {
    tasks: Vec<Task>,
}

impl RegistryConfig {
    pub fn add_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn finish(self) -> Result<TaskRegistry, GraphError> {
        let mut tasks = HashMap::with_capacity(self.tasks.len());

        for task in self.tasks {
            let name = task.name.clone();
            if tasks.insert(name.clone(), task).is_some() {
                return Err(GraphError::DuplicateTask(name));
            }
        }

        Ok(TaskRegistry { tasks })
    }
}
