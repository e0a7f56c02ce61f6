//! Version-conflict resolution.

use serde_json::Value;

use crate::models::{ConflictRecord, ConflictStrategy, QueueItem};

/// What the engine does with an item after its conflict is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// Server state stands; the local change is dropped.
    Discard,
    /// Send this body once more.
    Resend(Value),
}

/// A resolution decision plus the history record describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: ConflictRecord,
    pub action: ConflictAction,
}

/// Applies one fixed strategy to every conflict. Past records are never
/// consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    #[must_use]
    pub const fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    #[must_use]
    pub const fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    #[must_use]
    pub fn resolve(
        &self,
        item: &QueueItem,
        server_payload: Option<Value>,
        resolved_at: i64,
    ) -> Resolution {
        let action = match self.strategy {
            ConflictStrategy::ServerWins => ConflictAction::Discard,
            ConflictStrategy::LocalWins => {
                ConflictAction::Resend(rebase_on_server(&item.payload, server_payload.as_ref()))
            }
            ConflictStrategy::Merged => {
                ConflictAction::Resend(merge(&item.payload, server_payload.as_ref()))
            }
        };

        Resolution {
            record: ConflictRecord {
                id: 0,
                operation_id: item.id.to_string(),
                entity: item.entity(),
                local_payload: item.payload.clone(),
                server_payload,
                resolution: self.strategy,
                resolved_at,
            },
            action,
        }
    }
}

/// Local payload carrying the server's current `version`, so the resend is
/// accepted as a change on top of it.
fn rebase_on_server(local: &Value, server: Option<&Value>) -> Value {
    let mut payload = local.clone();
    if let (Some(fields), Some(version)) = (
        payload.as_object_mut(),
        server.and_then(|server| server.get("version")),
    ) {
        fields.insert("version".to_string(), version.clone());
    }
    payload
}

/// Server representation with the locally sent fields laid over it.
fn merge(local: &Value, server: Option<&Value>) -> Value {
    match (server.and_then(Value::as_object), local.as_object()) {
        (Some(server_fields), Some(local_fields)) => {
            let mut merged = server_fields.clone();
            for (key, value) in local_fields {
                if key != "version" {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Object(merged)
        }
        _ => local.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, NewOperation, OperationKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn update() -> QueueItem {
        QueueItem::new(NewOperation::entity(
            OperationKind::Update,
            Entity::Customer,
            json!({"id": "c-1", "phone": "555-0100", "version": 2}),
        ))
    }

    fn server() -> Value {
        json!({"id": "c-1", "name": "Acme", "phone": "555-0199", "version": 5})
    }

    #[test]
    fn server_wins_discards_local_change() {
        let item = update();
        let resolution = ConflictResolver::default().resolve(&item, Some(server()), 77);

        assert_eq!(resolution.action, ConflictAction::Discard);
        assert_eq!(resolution.record.resolution, ConflictStrategy::ServerWins);
        assert_eq!(resolution.record.operation_id, item.id.to_string());
        assert_eq!(resolution.record.entity, Some(Entity::Customer));
        assert_eq!(resolution.record.local_payload, item.payload);
        assert_eq!(resolution.record.server_payload, Some(server()));
        assert_eq!(resolution.record.resolved_at, 77);
    }

    #[test]
    fn local_wins_resends_on_server_version() {
        let resolution = ConflictResolver::new(ConflictStrategy::LocalWins).resolve(
            &update(),
            Some(server()),
            1,
        );
        assert_eq!(
            resolution.action,
            ConflictAction::Resend(json!({"id": "c-1", "phone": "555-0100", "version": 5}))
        );
    }

    #[test]
    fn merged_overlays_local_fields() {
        let resolution =
            ConflictResolver::new(ConflictStrategy::Merged).resolve(&update(), Some(server()), 1);
        assert_eq!(
            resolution.action,
            ConflictAction::Resend(
                json!({"id": "c-1", "name": "Acme", "phone": "555-0100", "version": 5})
            )
        );
    }

    #[test]
    fn missing_server_body_falls_back_to_local_payload() {
        let item = update();
        let resolution = ConflictResolver::new(ConflictStrategy::Merged).resolve(&item, None, 1);
        assert_eq!(resolution.action, ConflictAction::Resend(item.payload.clone()));
        assert_eq!(resolution.record.server_payload, None);
    }
}
