//! Shared tests for RetentionAuditLogRepo implementations

use serde_json::json;
use uuid::Uuid;

use super::harness::TestRepos;
use crate::models::{
    CreateRetentionAuditLog, RetentionAction, RetentionAuditLogQuery, RetentionTrigger,
};

pub async fn test_create_and_get(repos: &TestRepos) {
    let org_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let created = repos
        .retention_audit_logs()
        .create(CreateRetentionAuditLog {
            user_id,
            org_id,
            action: RetentionAction::Deleted,
            data_scope: Some(json!({ "conversations_deleted": 4 })),
            triggered_by: RetentionTrigger::Admin,
            details: Some("Manual purge".to_string()),
        })
        .await
        .expect("Failed to create audit entry");

    let fetched = repos
        .retention_audit_logs()
        .get_by_id(created.id)
        .await
        .unwrap()
        .expect("Entry should exist");
    assert_eq!(fetched.org_id, org_id);
    assert_eq!(fetched.user_id, user_id);
    assert_eq!(fetched.action, RetentionAction::Deleted);
    assert_eq!(fetched.triggered_by, RetentionTrigger::Admin);
    assert_eq!(fetched.data_scope, Some(json!({ "conversations_deleted": 4 })));
    assert_eq!(fetched.details.as_deref(), Some("Manual purge"));
}

pub async fn test_null_optional_fields(repos: &TestRepos) {
    let created = repos
        .retention_audit_logs()
        .create(CreateRetentionAuditLog::policy(
            Uuid::new_v4(),
            Uuid::new_v4(),
            RetentionAction::Marked,
        ))
        .await
        .unwrap();

    let fetched = repos
        .retention_audit_logs()
        .get_by_id(created.id)
        .await
        .unwrap()
        .unwrap();
    assert!(fetched.data_scope.is_none());
    assert!(fetched.details.is_none());
    assert_eq!(fetched.triggered_by, RetentionTrigger::Policy);
}

pub async fn test_list_filters_and_pagination(repos: &TestRepos) {
    let org_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    for action in [
        RetentionAction::Marked,
        RetentionAction::Recovered,
        RetentionAction::Marked,
    ] {
        repos
            .retention_audit_logs()
            .create(CreateRetentionAuditLog::policy(org_id, user_id, action))
            .await
            .unwrap();
    }
    repos
        .retention_audit_logs()
        .create(CreateRetentionAuditLog::policy(
            Uuid::new_v4(),
            user_id,
            RetentionAction::Deleted,
        ))
        .await
        .unwrap();

    let by_org = RetentionAuditLogQuery {
        org_id: Some(org_id),
        ..Default::default()
    };
    assert_eq!(repos.retention_audit_logs().count(by_org.clone()).await.unwrap(), 3);

    let marked = repos
        .retention_audit_logs()
        .count(RetentionAuditLogQuery {
            action: Some(RetentionAction::Marked),
            ..by_org.clone()
        })
        .await
        .unwrap();
    assert_eq!(marked, 2);

    let first_page = repos
        .retention_audit_logs()
        .list(RetentionAuditLogQuery {
            limit: Some(2),
            ..by_org.clone()
        })
        .await
        .unwrap();
    assert_eq!(first_page.items.len(), 2);
    assert!(first_page.has_more);
    assert!(first_page.items[0].created_at >= first_page.items[1].created_at);

    let second_page = repos
        .retention_audit_logs()
        .list(RetentionAuditLogQuery {
            limit: Some(2),
            offset: Some(2),
            ..by_org
        })
        .await
        .unwrap();
    assert_eq!(second_page.items.len(), 1);
    assert!(!second_page.has_more);

    assert_eq!(
        repos
            .retention_audit_logs()
            .count(RetentionAuditLogQuery::default())
            .await
            .unwrap(),
        4
    );
}

mod sqlite_tests {
    sqlite_test!(test_create_and_get);
    sqlite_test!(test_null_optional_fields);
    sqlite_test!(test_list_filters_and_pagination);
}
