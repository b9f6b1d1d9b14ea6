use crate::crawler::Task;
use std::collections::HashMap;
use std::sync::Arc;

/// Name to task lookup, filled at startup and read-only during a run
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task under its name
    ///
    /// Returns the task previously registered under that name, if any.
    pub fn add(&mut self, task: Task) -> Option<Arc<Task>> {
        self.tasks.insert(task.name().to_string(), Arc::new(task))
    }

    /// Builder-style [`TaskRegistry::add`]
    pub fn with(mut self, task: Task) -> Self {
        self.add(task);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Task>> {
        self.tasks.get(name)
    }

    /// Returns the registered task names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the item fields declared by a task's rule
    pub fn fields(&self, task: &str, rule: &str) -> Option<&[String]> {
        self.tasks
            .get(task)?
            .rules
            .get(rule)
            .map(|rule| rule.item_fields.as_slice())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
