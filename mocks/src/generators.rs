//! Random test data generators using the `fake` and `proptest` crates.
//!
//! Realistic titles/descriptions via `fake`, plus `proptest` strategies for
//! property-based tests over the task model.

use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::faker::name::en::Name;
use fake::Fake;
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use task_core::models::*;

pub fn generate_task_title() -> String {
    Sentence(3..8).fake()
}

pub fn generate_task_description() -> String {
    Paragraph(1..3).fake()
}

pub fn generate_assignee_name() -> String {
    Name().fake()
}

pub fn generate_random_status() -> TaskStatus {
    const STATUSES: &[TaskStatus] = &[
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Testing,
        TaskStatus::Done,
        TaskStatus::Cancelled,
        TaskStatus::Archived,
    ];
    *STATUSES.choose(&mut rand::thread_rng()).unwrap()
}

pub fn generate_random_priority() -> Priority {
    const PRIORITIES: &[Priority] = &[Priority::Low, Priority::Medium, Priority::High, Priority::Critical, Priority::Urgent];
    *PRIORITIES.choose(&mut rand::thread_rng()).unwrap()
}

pub fn generate_random_task(branch_id: Id) -> Task {
    let now = chrono::Utc::now();
    Task {
        id: Id::new_v4(),
        branch_id,
        owner_user_id: "test-user".to_string(),
        title: generate_task_title(),
        description: generate_task_description(),
        status: TaskStatus::Todo,
        priority: generate_random_priority(),
        assignee_ids: Vec::new(),
        label_ids: Vec::new(),
        due_date: None,
        estimated_effort: Some(rand::thread_rng().gen_range(1..40)),
        context_id: None,
        progress_history: Default::default(),
        progress_count: 0,
        progress: 0,
        created_at: now,
        updated_at: now,
        version: 1,
    }
}

/// Generator bundle for spinning up a batch of related random tasks.
pub struct TaskGenerator {
    pub branch_id: Id,
}

impl TaskGenerator {
    pub fn new(branch_id: Id) -> Self {
        Self { branch_id }
    }

    pub fn generate(&self) -> Task {
        generate_random_task(self.branch_id)
    }

    pub fn generate_batch(&self, count: usize) -> Vec<Task> {
        (0..count).map(|_| self.generate()).collect()
    }
}

pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Review),
        Just(TaskStatus::Testing),
        Just(TaskStatus::Done),
        Just(TaskStatus::Cancelled),
        Just(TaskStatus::Archived),
    ]
}

pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::Low), Just(Priority::Medium), Just(Priority::High), Just(Priority::Critical), Just(Priority::Urgent),]
}

pub fn task_title_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{3,40}"
}

prop_compose! {
    pub fn task_strategy(branch_id: Id)(
        title in task_title_strategy(),
        status in task_status_strategy(),
        priority in priority_strategy(),
    ) -> Task {
        let now = chrono::Utc::now();
        Task {
            id: Id::new_v4(),
            branch_id,
            owner_user_id: "test-user".to_string(),
            title,
            description: String::new(),
            status,
            priority,
            assignee_ids: Vec::new(),
            label_ids: Vec::new(),
            due_date: None,
            estimated_effort: None,
            context_id: None,
            progress_history: Default::default(),
            progress_count: 0,
            progress: 0,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

prop_compose! {
    pub fn task_filter_strategy()(
        status in proptest::option::of(task_status_strategy()),
        priority in proptest::option::of(priority_strategy()),
        limit in proptest::option::of(1u32..100),
    ) -> TaskFilter {
        TaskFilter {
            branch_id: None,
            status,
            priority,
            assignee_id: None,
            label: None,
            limit,
            offset: None,
        }
    }
}
