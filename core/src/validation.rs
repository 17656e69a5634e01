use crate::error::{OrchestratorError, Result};
use crate::models::{NewProject, NewSubtask, NewTask};

/// Field-level validation shared by the task/project/branch/subtask
/// services before anything reaches a repository.
pub struct Validator;

impl Validator {
    pub fn validate_name(field: &str, name: &str, max_len: usize) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::empty_field(field));
        }
        if trimmed.len() > max_len {
            return Err(OrchestratorError::validation(
                field,
                format!("must be at most {max_len} characters long"),
            ));
        }
        Ok(())
    }

    pub fn validate_progress_percentage(value: u8) -> Result<()> {
        if value > 100 {
            return Err(OrchestratorError::validation(
                "progress_percentage",
                "must be between 0 and 100",
            ));
        }
        Ok(())
    }

    pub fn validate_new_project(project: &NewProject) -> Result<()> {
        Self::validate_name("name", &project.name, 200)
    }

    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        Self::validate_name("title", &task.title, 200)?;
        if task.description.len() > 10_000 {
            return Err(OrchestratorError::validation(
                "description",
                "must be at most 10000 characters long",
            ));
        }
        Ok(())
    }

    pub fn validate_new_subtask(subtask: &NewSubtask) -> Result<()> {
        Self::validate_name("title", &subtask.title, 200)?;
        Self::validate_progress_percentage(subtask.progress_percentage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use uuid::Uuid;

    #[test]
    fn rejects_empty_title() {
        let task = NewTask {
            branch_id: Uuid::new_v4(),
            title: "   ".to_string(),
            description: String::new(),
            priority: Priority::Medium,
            assignee_ids: vec![],
            label_ids: vec![],
            due_date: None,
            estimated_effort: None,
            agent_role_label: None,
        };
        assert!(Validator::validate_new_task(&task).is_err());
    }

    #[test]
    fn rejects_out_of_range_progress() {
        assert!(Validator::validate_progress_percentage(101).is_err());
        assert!(Validator::validate_progress_percentage(100).is_ok());
        assert!(Validator::validate_progress_percentage(0).is_ok());
    }
}
