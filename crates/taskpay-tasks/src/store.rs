use crate::instance::{InstanceStatus, TaskInstance};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use taskpay_types::{Result, UserId};
use tokio::sync::RwLock;
use tracing::debug;

/// Persistence seam for task instances. Instances share the authoritative
/// store family with profiles rather than living in client-local state, so
/// clearing a client cache can never lose in-flight work.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get(&self, instance_id: &str) -> Result<Option<TaskInstance>>;
    async fn put(&self, instance: &TaskInstance) -> Result<()>;
    /// All of a user's attempts, oldest first.
    async fn for_user(&self, user: &UserId) -> Result<Vec<TaskInstance>>;
    async fn in_progress_for_task(
        &self,
        user: &UserId,
        task_id: &str,
    ) -> Result<Option<TaskInstance>>;
    /// Every instance that has not reached `Approved`, across all users.
    async fn unapproved(&self) -> Result<Vec<TaskInstance>>;
}

pub struct MemoryInstanceStore {
    instances: Arc<RwLock<HashMap<String, TaskInstance>>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryInstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn get(&self, instance_id: &str) -> Result<Option<TaskInstance>> {
        let instances = self.instances.read().await;
        Ok(instances.get(instance_id).cloned())
    }

    async fn put(&self, instance: &TaskInstance) -> Result<()> {
        let mut instances = self.instances.write().await;
        debug!(
            instance_id = %instance.instance_id,
            status = ?instance.status,
            storage_type = "memory",
            "💾 Instance stored"
        );
        instances.insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }

    async fn for_user(&self, user: &UserId) -> Result<Vec<TaskInstance>> {
        let instances = self.instances.read().await;
        let mut result: Vec<TaskInstance> = instances
            .values()
            .filter(|i| &i.user == user)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(result)
    }

    async fn in_progress_for_task(
        &self,
        user: &UserId,
        task_id: &str,
    ) -> Result<Option<TaskInstance>> {
        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .find(|i| {
                &i.user == user && i.task_id == task_id && i.status == InstanceStatus::InProgress
            })
            .cloned())
    }

    async fn unapproved(&self) -> Result<Vec<TaskInstance>> {
        let instances = self.instances.read().await;
        let mut result: Vec<TaskInstance> = instances
            .values()
            .filter(|i| i.status != InstanceStatus::Approved)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskCatalog;
    use chrono::Utc;

    #[tokio::test]
    async fn test_store_round_trip_and_queries() {
        let store = MemoryInstanceStore::new();
        let catalog = TaskCatalog::builtin();
        let user = UserId::new("u1");
        let now = Utc::now();

        let first = TaskInstance::start(user.clone(), catalog.get("task1").unwrap(), now);
        let second = TaskInstance::start(
            user.clone(),
            catalog.get("task2").unwrap(),
            now + chrono::Duration::seconds(5),
        );
        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        let mine = store.for_user(&user).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].instance_id, first.instance_id);

        let resumable = store
            .in_progress_for_task(&user, "task2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumable.instance_id, second.instance_id);

        assert!(store
            .in_progress_for_task(&UserId::new("someone-else"), "task2")
            .await
            .unwrap()
            .is_none());

        assert_eq!(store.unapproved().await.unwrap().len(), 2);
    }
}
