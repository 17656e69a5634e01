use serde::{Deserialize, Serialize};

use super::Id;

/// A freestanding tag attachable to tasks via the `task_labels` join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Label {
    pub id: Id,
    pub name: String,
}
