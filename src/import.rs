//! Bulk task import from TOML.
//!
//! ```toml
//! [[task]]
//! name = "Branch cash verification"
//! category = "cash"
//! priority = "high"
//! frequency = "monthly"
//! is_recurring = true
//! due_date = "2026-11-30"
//! maker = "u-maker"
//! checker1 = "u-check1"
//! checker2 = "u-check2"
//! ```
//!
//! Dates are quoted ISO strings. Every entry is validated before any is
//! returned. Storing the result goes through
//! [`TaskWorkflowEngine::import_tasks`](crate::engine::TaskWorkflowEngine::import_tasks),
//! which writes the whole batch or nothing.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::NewTask;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ImportFile {
    #[serde(default)]
    task: Vec<NewTask>,
}

/// Parse and validate an import document.
pub fn parse_tasks(content: &str) -> Result<Vec<NewTask>> {
    let file: ImportFile =
        toml::from_str(content).map_err(|e| Error::Validation(format!("import file: {e}")))?;

    for (i, task) in file.task.iter().enumerate() {
        task.validate().map_err(|e| match e {
            Error::Validation(msg) => Error::Validation(format!("task #{} ({}): {msg}", i + 1, task.name)),
            other => other,
        })?;
    }
    Ok(file.task)
}

/// Read and parse an import file from disk.
pub fn load_tasks(path: &Path) -> Result<Vec<NewTask>> {
    let content = std::fs::read_to_string(path)?;
    parse_tasks(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Frequency, Priority};

    #[test]
    fn parses_tasks_with_defaults() {
        let tasks = parse_tasks(
            r#"
            [[task]]
            name = "Vault dual control"
            due_date = "2026-12-01"
            maker = "m1"
            checker1 = "c1"
            checker2 = "c2"

            [[task]]
            name = "KYC sample"
            priority = "high"
            frequency = "quarterly"
            is_recurring = true
            due_date = "2026-12-31"
            assigned_to = "m2"
            checker1 = "c1"
            checker2 = "c2"
            "#,
        )
        .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(tasks[0].frequency, Frequency::Monthly);
        assert_eq!(tasks[1].priority, Priority::High);
        assert_eq!(tasks[1].frequency, Frequency::Quarterly);
        assert!(tasks[1].is_recurring);
    }

    #[test]
    fn one_bad_entry_rejects_the_file() {
        let err = parse_tasks(
            r#"
            [[task]]
            name = "Fine"
            due_date = "2026-12-01"
            maker = "m1"
            checker1 = "c1"
            checker2 = "c2"

            [[task]]
            name = "Self review"
            due_date = "2026-12-01"
            maker = "m1"
            checker1 = "m1"
            checker2 = "c2"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("task #2"));
    }

    #[test]
    fn empty_file_imports_nothing() {
        assert!(parse_tasks("").unwrap().is_empty());
    }
}
