// src/audit.rs
//! In-memory audit trail for mutating actions.

use actix_web::HttpRequest;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::AuthContext;

#[derive(Debug, Clone, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Collects field-level differences for one entity update.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ChangeSet {
    pub changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: ToString + PartialEq>(&mut self, field: &str, old: &T, new: &T) {
        if old != new {
            self.changes.push(FieldChange {
                field: field.to_string(),
                old_value: Some(old.to_string()),
                new_value: Some(new.to_string()),
            });
        }
    }

    pub fn add_opt<T: ToString + PartialEq>(&mut self, field: &str, old: &Option<T>, new: &Option<T>) {
        if old != new {
            self.changes.push(FieldChange {
                field: field.to_string(),
                old_value: old.as_ref().map(ToString::to_string),
                new_value: new.as_ref().map(ToString::to_string),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn describe(&self) -> String {
        self.changes
            .iter()
            .map(|c| {
                format!(
                    "{}: {} -> {}",
                    c.field,
                    c.old_value.as_deref().unwrap_or("-"),
                    c.new_value.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub description: Option<String>,
    pub changes: Option<ChangeSet>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action: Option<String>,
    pub username: Option<String>,
}

pub fn client_ip(request: &HttpRequest) -> Option<String> {
    request
        .connection_info()
        .realip_remote_addr()
        .map(|s| s.to_string())
}

#[derive(Default)]
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        ctx: Option<&AuthContext>,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        description: Option<String>,
        changes: Option<ChangeSet>,
        ip_address: Option<String>,
    ) {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            user_id: ctx.map(|c| c.user_id.clone()),
            username: ctx.map(|c| c.username.clone()),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            description,
            changes: changes.filter(|c| !c.is_empty()),
            ip_address,
            created_at: Utc::now(),
        };

        log::debug!("audit: {} {} {:?}", entry.action, entry.entity_type, entry.entity_id);
        self.entries.write().await.push(entry);
    }

    /// Shorthand for the common case of a user acting on one entity.
    pub async fn audit(
        &self,
        ctx: &AuthContext,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        description: impl Into<String>,
        request: &HttpRequest,
    ) {
        self.record(
            Some(ctx),
            action,
            entity_type,
            Some(entity_id),
            Some(description.into()),
            None,
            client_ip(request),
        )
        .await;
    }

    /// Newest first.
    pub async fn list(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| query.entity_type.as_ref().map_or(true, |t| &e.entity_type == t))
            .filter(|e| query.entity_id.as_ref().map_or(true, |id| e.entity_id.as_ref() == Some(id)))
            .filter(|e| query.action.as_ref().map_or(true, |a| &e.action == a))
            .filter(|e| query.username.as_ref().map_or(true, |u| e.username.as_ref() == Some(u)))
            .cloned()
            .collect()
    }

    /// Drops entries older than `retention_days`; returns how many were removed.
    pub async fn cleanup(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.created_at >= cutoff);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn ctx() -> AuthContext {
        AuthContext {
            user_id: "u-1".to_string(),
            username: "warehouse".to_string(),
            role: Role::Warehouse,
        }
    }

    #[test]
    fn test_change_set_skips_equal_values() {
        let mut changes = ChangeSet::new();
        changes.add("location", &"WH-A".to_string(), &"WH-A".to_string());
        assert!(changes.is_empty());

        changes.add("location", &"WH-A".to_string(), &"WH-B".to_string());
        changes.add_opt::<String>("notes", &None, &Some("moved".to_string()));
        assert_eq!(changes.describe(), "location: WH-A -> WH-B, notes: - -> moved");
    }

    #[tokio::test]
    async fn test_record_and_filter() {
        let log = AuditLog::new();
        log.record(Some(&ctx()), "create", "batch", Some("b-1"), None, None, None).await;
        log.record(Some(&ctx()), "delete", "batch", Some("b-2"), None, Some(ChangeSet::new()), None)
            .await;
        log.record(None, "expire", "batch", Some("b-1"), None, None, None).await;

        let all = log.list(&AuditQuery::default()).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, "expire");
        assert!(all[1].changes.is_none());

        let query = AuditQuery {
            entity_id: Some("b-1".to_string()),
            ..Default::default()
        };
        assert_eq!(log.list(&query).await.len(), 2);

        let query = AuditQuery {
            username: Some("warehouse".to_string()),
            ..Default::default()
        };
        assert_eq!(log.list(&query).await.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let log = AuditLog::new();
        log.record(None, "create", "batch", None, None, None, None).await;
        {
            let mut entries = log.entries.write().await;
            entries[0].created_at = Utc::now() - Duration::days(400);
        }
        log.record(None, "create", "batch", None, None, None, None).await;

        assert_eq!(log.cleanup(365).await, 1);
        assert_eq!(log.len().await, 1);
    }
}
