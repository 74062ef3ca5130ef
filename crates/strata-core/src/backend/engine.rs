//! Backend that delegates to the external engine CLI

use super::{StackRecord, StateBackend};
use crate::error::{Result, StrataError};
use crate::exec::{CommandOptions, CommandRequest, SharedExecutor};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;

/// One entry of `stack ls --json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineStack {
    name: String,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    update_in_progress: bool,
    #[serde(default)]
    resource_count: Option<u64>,
    #[serde(default)]
    url: Option<String>,
}

/// Backend driving `<engine> stack ...` through a [`CommandExecutor`](crate::exec::CommandExecutor)
pub struct EngineBackend {
    executor: SharedExecutor,
    options: CommandOptions,
}

impl EngineBackend {
    pub fn new(executor: SharedExecutor, options: CommandOptions) -> Self {
        Self { executor, options }
    }

    fn request(&self, verb: &[&str]) -> CommandRequest {
        CommandRequest::new(verb, &self.options)
    }

    /// Split `org/project/stack` (or `project/stack`, or `stack`)
    fn split_name(name: &str, default_project: &str) -> (String, String) {
        let parts: Vec<&str> = name.split('/').collect();
        match parts.as_slice() {
            [.., project, stack] => (project.to_string(), stack.to_string()),
            _ => (default_project.to_string(), name.to_string()),
        }
    }
}

impl StateBackend for EngineBackend {
    fn kind(&self) -> &'static str {
        "engine"
    }

    fn list_stacks(&self, project: Option<&str>) -> Result<Vec<StackRecord>> {
        let mut request = self.request(&["stack", "ls"]).arg("--json");
        if project.is_none() {
            request = request.arg("--all");
        }
        let output = self.executor.run(&request)?;
        let stacks: Vec<EngineStack> = serde_json::from_str(&output.stdout).map_err(|e| {
            StrataError::Serialization(format!("unexpected `stack ls` output: {}", e))
        })?;

        let default_project = project.unwrap_or_default();
        Ok(stacks
            .into_iter()
            .map(|stack| {
                let (project, name) = Self::split_name(&stack.name, default_project);
                StackRecord {
                    project,
                    name,
                    last_update: stack.last_update,
                    update_in_progress: stack.update_in_progress,
                    resource_count: stack.resource_count,
                    url: stack.url,
                }
            })
            .filter(|record| project.map_or(true, |p| record.project == p))
            .collect())
    }

    fn stack_exists(&self, project: &str, stack: &str) -> Result<bool> {
        Ok(self
            .list_stacks(Some(project))?
            .iter()
            .any(|record| record.name == stack))
    }

    fn create_stack(&self, project: &str, stack: &str, initial: &[u8]) -> Result<()> {
        if self.stack_exists(project, stack)? {
            return Err(StrataError::already_exists(format!(
                "stack '{}' in project '{}'",
                stack, project
            )));
        }
        self.executor
            .run(&self.request(&["stack", "init"]).arg(stack))?;
        self.save_snapshot(project, stack, initial)
    }

    fn remove_stack(&self, _project: &str, stack: &str) -> Result<()> {
        self.executor
            .run(&self.request(&["stack", "rm"]).arg("--yes").stack(stack))?;
        Ok(())
    }

    fn load_snapshot(&self, _project: &str, stack: &str) -> Result<Vec<u8>> {
        let output = self
            .executor
            .run(&self.request(&["stack", "export"]).stack(stack))?;
        Ok(output.stdout.into_bytes())
    }

    fn save_snapshot(&self, _project: &str, stack: &str, document: &[u8]) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("strata-import-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(document)?;
        file.flush()?;

        let path = file.path().to_string_lossy().into_owned();
        self.executor.run(
            &self
                .request(&["stack", "import"])
                .args(["--file", path.as_str()])
                .stack(stack),
        )?;
        Ok(())
    }
}
