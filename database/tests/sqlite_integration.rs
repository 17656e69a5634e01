use std::sync::Arc;

use database::{
    BranchContextRepository, BranchRepository, Db, DelegationRepository, GlobalContextRepository,
    ProjectContextRepository, ProjectRepository, SqliteBranchContextRepository,
    SqliteBranchRepository, SqliteDelegationRepository, SqliteGlobalContextRepository,
    SqliteProjectContextRepository, SqliteProjectRepository, SqliteTaskContextRepository,
    SqliteTaskDependencyRepository, SqliteTaskRepository, TaskContextRepository,
    TaskDependencyRepository, TaskRepository,
};
use task_core::cache::CacheLayer;
use task_core::context_service::ContextService;
use task_core::error::OrchestratorError;
use task_core::models::{ContextLevel, NewBranch, NewProject, NewTask, Priority};
use task_core::task_service::TaskService;

async fn test_db() -> Db {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let db_name = format!(":memory:test_{timestamp}");
    let db = Db::connect(&db_name).await.unwrap();
    db.migrate().await.unwrap();
    db
}

#[tokio::test]
async fn health_check_passes_after_migration() {
    let db = test_db().await;
    assert!(db.health_check().await.is_ok());
}

#[tokio::test]
async fn project_create_and_list_is_owner_scoped() {
    let db = test_db().await;
    let repo = SqliteProjectRepository::new(db);

    repo.create("user-a", NewProject { name: "alpha".into(), description: String::new() })
        .await
        .unwrap();
    repo.create("user-b", NewProject { name: "beta".into(), description: String::new() })
        .await
        .unwrap();

    let a_projects = repo.list("user-a", 10, 0).await.unwrap();
    assert_eq!(a_projects.len(), 1);
    assert_eq!(a_projects[0].name, "alpha");
}

#[tokio::test]
async fn project_name_unique_per_owner_fails_on_duplicate() {
    let db = test_db().await;
    let repo = SqliteProjectRepository::new(db);

    repo.create("user-a", NewProject { name: "dup".into(), description: String::new() })
        .await
        .unwrap();
    let result = repo
        .create("user-a", NewProject { name: "dup".into(), description: String::new() })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn branch_and_task_lifecycle() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let branches = SqliteBranchRepository::new(db.clone());
    let tasks = SqliteTaskRepository::new(db.clone());

    let project = projects
        .create("user-a", NewProject { name: "proj".into(), description: String::new() })
        .await
        .unwrap();

    let branch = branches
        .create(
            "user-a",
            NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None },
        )
        .await
        .unwrap();

    let task = tasks
        .create(
            "user-a",
            NewTask {
                branch_id: branch.id,
                title: "do the thing".into(),
                description: String::new(),
                priority: Priority::High,
                assignee_ids: vec!["agent-1".into()],
                label_ids: vec![],
                due_date: None,
                estimated_effort: None,
                agent_role_label: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(task.version, 1);
    assert_eq!(task.assignee_ids, vec!["agent-1".to_string()]);

    let fetched = tasks.get_by_id("user-a", task.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "do the thing");

    let invisible = tasks.get_by_id("user-b", task.id).await.unwrap();
    assert!(invisible.is_none());
}

#[tokio::test]
async fn task_update_conflict_detected_on_stale_version() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let branches = SqliteBranchRepository::new(db.clone());
    let tasks = SqliteTaskRepository::new(db.clone());

    let project = projects
        .create("user-a", NewProject { name: "proj".into(), description: String::new() })
        .await
        .unwrap();
    let branch = branches
        .create("user-a", NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None })
        .await
        .unwrap();
    let task = tasks
        .create(
            "user-a",
            NewTask {
                branch_id: branch.id,
                title: "t".into(),
                description: String::new(),
                priority: Priority::Medium,
                assignee_ids: vec![],
                label_ids: vec![],
                due_date: None,
                estimated_effort: None,
                agent_role_label: None,
            },
        )
        .await
        .unwrap();

    let mut updates = task_core::models::UpdateTask::default();
    updates.title = Some("t2".into());
    tasks.update("user-a", task.id, updates.clone(), Some(task.version)).await.unwrap();

    let stale_result = tasks.update("user-a", task.id, updates, Some(task.version)).await;
    assert!(stale_result.is_err());
}

#[tokio::test]
async fn dependency_edges_are_stored_and_scoped() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let branches = SqliteBranchRepository::new(db.clone());
    let tasks = SqliteTaskRepository::new(db.clone());
    let deps = SqliteTaskDependencyRepository::new(db.clone());

    let project = projects
        .create("user-a", NewProject { name: "proj".into(), description: String::new() })
        .await
        .unwrap();
    let branch = branches
        .create("user-a", NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None })
        .await
        .unwrap();

    async fn make_task(tasks: &SqliteTaskRepository, branch_id: task_core::models::Id, title: &str) -> task_core::models::Task {
        tasks
            .create(
                "user-a",
                NewTask {
                    branch_id,
                    title: title.to_string(),
                    description: String::new(),
                    priority: Priority::Medium,
                    assignee_ids: vec![],
                    label_ids: vec![],
                    due_date: None,
                    estimated_effort: None,
                    agent_role_label: None,
                },
            )
            .await
            .unwrap()
    }

    let t1 = make_task(&tasks, branch.id, "first").await;
    let t2 = make_task(&tasks, branch.id, "second").await;

    deps.add("user-a", t2.id, t1.id).await.unwrap();
    let edges = deps.all_edges("user-a").await.unwrap();
    assert_eq!(edges, vec![(t2.id, t1.id)]);

    let depends = deps.depends_on("user-a", t2.id).await.unwrap();
    assert_eq!(depends, vec![t1.id]);
}

#[tokio::test]
async fn global_context_get_or_create_is_idempotent() {
    let db = test_db().await;
    let repo = SqliteGlobalContextRepository::new(db);

    let first = repo.get_or_create("user-a").await.unwrap();
    assert_eq!(first.version, 1);
    let second = repo.get_or_create("user-a").await.unwrap();
    assert_eq!(second.version, 1);
}

#[tokio::test]
async fn project_context_update_bumps_version_and_conflicts_on_stale_cas() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let contexts = SqliteProjectContextRepository::new(db.clone());

    let project = projects
        .create("user-a", NewProject { name: "proj".into(), description: String::new() })
        .await
        .unwrap();

    let created = contexts.create("user-a", project.id, serde_json::Map::new(), true).await.unwrap();
    assert_eq!(created.version, 1);

    let mut patch = serde_json::Map::new();
    patch.insert("tech_stack".into(), serde_json::json!("rust"));
    let updated = contexts.update("user-a", project.id, Some(patch), None, Some(1)).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.data.get("tech_stack").unwrap(), "rust");

    let stale = contexts.update("user-a", project.id, None, None, Some(1)).await;
    assert!(stale.is_err());
}

async fn test_task_service(db: Db) -> TaskService {
    let tasks = Arc::new(SqliteTaskRepository::new(db.clone()));
    let subtasks = Arc::new(database::SqliteSubtaskRepository::new(db.clone()));
    let deps = Arc::new(SqliteTaskDependencyRepository::new(db.clone()));
    let context_service = Arc::new(test_context_service(db));
    TaskService::new(tasks, subtasks, deps, context_service, None)
}

fn test_context_service(db: Db) -> ContextService {
    ContextService::new(
        Arc::new(SqliteGlobalContextRepository::new(db.clone())),
        Arc::new(SqliteProjectContextRepository::new(db.clone())),
        Arc::new(SqliteBranchContextRepository::new(db.clone())),
        Arc::new(SqliteTaskContextRepository::new(db.clone())),
        Arc::new(SqliteDelegationRepository::new(db.clone())),
        Arc::new(SqliteBranchRepository::new(db.clone())),
        Arc::new(SqliteTaskRepository::new(db.clone())),
        Arc::new(CacheLayer::new(60)),
    )
}

/// §8 scenario 3: t2 depends on t1, t3 depends on t2, then closing the loop
/// with t1 depends on t3 is rejected with the offending path in `meta.cycle`.
#[tokio::test]
async fn dependency_cycle_is_rejected_with_the_closing_path() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let branches = SqliteBranchRepository::new(db.clone());
    let task_service = test_task_service(db.clone()).await;

    let project = projects.create("user-a", NewProject { name: "proj".into(), description: String::new() }).await.unwrap();
    let branch = branches
        .create("user-a", NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None })
        .await
        .unwrap();

    async fn make(task_service: &TaskService, branch_id: task_core::models::Id, title: &str) -> task_core::models::Task {
        task_service
            .create(
                "user-a",
                NewTask {
                    branch_id,
                    title: title.to_string(),
                    description: String::new(),
                    priority: Priority::Medium,
                    assignee_ids: vec![],
                    label_ids: vec![],
                    due_date: None,
                    estimated_effort: None,
                    agent_role_label: None,
                },
            )
            .await
            .unwrap()
    }

    let t1 = make(&task_service, branch.id, "t1").await;
    let t2 = make(&task_service, branch.id, "t2").await;
    let t3 = make(&task_service, branch.id, "t3").await;

    task_service.add_dependency("user-a", t2.id, t1.id).await.unwrap();
    task_service.add_dependency("user-a", t3.id, t2.id).await.unwrap();

    let result = task_service.add_dependency("user-a", t1.id, t3.id).await;
    match result {
        Err(OrchestratorError::DependencyCycle(cycle)) => {
            assert_eq!(cycle.first(), cycle.last());
            let distinct: std::collections::HashSet<_> = cycle.iter().copied().collect();
            assert_eq!(distinct, [t1.id, t2.id, t3.id].into_iter().collect());
        }
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
}

/// §8 scenario 4: a project-level override shadows the global setting, and
/// removing the override falls back to the global value on the next resolve.
#[tokio::test]
async fn inheritance_resolution_falls_back_after_override_removed() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let branches = SqliteBranchRepository::new(db.clone());
    let project_contexts = SqliteProjectContextRepository::new(db.clone());
    let context_service = test_context_service(db.clone());

    let mut theme = serde_json::Map::new();
    theme.insert("theme".to_string(), serde_json::json!("dark"));
    context_service.update_global("user-a", theme, None).await.unwrap();

    let project = projects.create("user-a", NewProject { name: "proj".into(), description: String::new() }).await.unwrap();
    let branch = branches
        .create("user-a", NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None })
        .await
        .unwrap();

    let mut override_theme = serde_json::Map::new();
    override_theme.insert("theme".to_string(), serde_json::json!("light"));
    project_contexts.create("user-a", project.id, override_theme, true).await.unwrap();

    let resolved = context_service.resolve(ContextLevel::Branch, branch.id, "user-a", false).await.unwrap();
    assert_eq!(resolved.data.get("theme").unwrap(), "light");

    project_contexts.delete("user-a", project.id).await.unwrap();
    let refreshed = context_service.resolve(ContextLevel::Branch, branch.id, "user-a", true).await.unwrap();
    assert_eq!(refreshed.data.get("theme").unwrap(), "dark");
}

/// §8 scenario 5: delegating a task-level payload up to the project only
/// mutates the project context on approval, and leaves the source untouched.
#[tokio::test]
async fn delegation_upward_merges_into_target_on_approval() {
    let db = test_db().await;
    let projects = SqliteProjectRepository::new(db.clone());
    let branches = SqliteBranchRepository::new(db.clone());
    let task_service = test_task_service(db.clone()).await;
    let context_service = test_context_service(db.clone());

    let project = projects.create("user-a", NewProject { name: "proj".into(), description: String::new() }).await.unwrap();
    let branch = branches
        .create("user-a", NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None })
        .await
        .unwrap();
    let task = task_service
        .create(
            "user-a",
            NewTask {
                branch_id: branch.id,
                title: "t".into(),
                description: String::new(),
                priority: Priority::Medium,
                assignee_ids: vec![],
                label_ids: vec![],
                due_date: None,
                estimated_effort: None,
                agent_role_label: None,
            },
        )
        .await
        .unwrap();

    let task_context = context_service.resolve(ContextLevel::Task, task.id, "user-a", false).await.unwrap();
    let task_version_before = task_context.version;

    let payload = serde_json::json!({ "auth_flow": "oauth2-pkce" });
    let request = context_service
        .delegate(ContextLevel::Task, task.id, ContextLevel::Project, project.id, "user-a", payload, "shared auth pattern".into())
        .await
        .unwrap();
    assert_eq!(request.status, task_core::models::DelegationStatus::Pending);

    let decided = context_service.apply_delegation("user-a", request.id, true).await.unwrap();
    assert_eq!(decided.status, task_core::models::DelegationStatus::Approved);

    let project_resolved = context_service.resolve(ContextLevel::Project, project.id, "user-a", true).await.unwrap();
    assert_eq!(project_resolved.data.get("auth_flow").unwrap(), "oauth2-pkce");

    let task_resolved_again = context_service.resolve(ContextLevel::Task, task.id, "user-a", true).await.unwrap();
    assert_eq!(task_resolved_again.version, task_version_before);
    assert!(task_resolved_again.data.get("auth_flow").is_none());
}

/// §8: delegating from a higher tier down (e.g. branch to task) is rejected
/// without enqueueing anything.
#[tokio::test]
async fn delegation_rejects_downward_direction() {
    let db = test_db().await;
    let branches = SqliteBranchRepository::new(db.clone());
    let projects = SqliteProjectRepository::new(db.clone());
    let task_service = test_task_service(db.clone()).await;
    let context_service = test_context_service(db.clone());

    let project = projects.create("user-a", NewProject { name: "proj".into(), description: String::new() }).await.unwrap();
    let branch = branches
        .create("user-a", NewBranch { project_id: project.id, name: "main".into(), description: String::new(), assigned_agent_id: None })
        .await
        .unwrap();
    let task = task_service
        .create(
            "user-a",
            NewTask {
                branch_id: branch.id,
                title: "t".into(),
                description: String::new(),
                priority: Priority::Medium,
                assignee_ids: vec![],
                label_ids: vec![],
                due_date: None,
                estimated_effort: None,
                agent_role_label: None,
            },
        )
        .await
        .unwrap();

    let result = context_service
        .delegate(ContextLevel::Branch, branch.id, ContextLevel::Task, task.id, "user-a", serde_json::json!({}), "wrong direction".into())
        .await;
    assert!(matches!(result, Err(OrchestratorError::DelegationDirection(_))));
}
