//! Warning state persisted between ticks
//!
//! The only memory that survives across ticks is one timestamp per VM meaning
//! "a warning went out at T and has not been resolved". In production it lives
//! in a tag on the VM itself.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::cloud::ResourceTagWriter;
use crate::error::CloudError;
use crate::models::TagSet;

/// Key-value store for a single VM's unresolved warning
#[async_trait]
pub trait WarningStateStore: Send + Sync {
    /// Unresolved warning time, if any; unreadable values count as absent
    async fn get(&self) -> Option<DateTime<Utc>>;

    /// Record a warning, replacing any previous one
    async fn set(&mut self, at: DateTime<Utc>) -> Result<(), CloudError>;

    /// Clear the warning; a no-op when none is recorded
    async fn delete(&mut self) -> Result<(), CloudError>;
}

/// Encode a warning timestamp for storage (RFC 3339, e.g. `2024-05-01T12:00:00+00:00`)
pub fn format_warning_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Decode a stored warning timestamp
///
/// Values without an offset are read as UTC.
pub fn parse_warning_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Warning state kept in a tag on the VM resource
///
/// Works on the tag snapshot taken when the VM was listed. Every mutation
/// writes the whole tag set back; concurrent edits by anyone else between
/// listing and write are lost.
pub struct TagWarningStore {
    writer: Arc<dyn ResourceTagWriter>,
    resource_id: String,
    tags: TagSet,
    tag_key: String,
}

impl TagWarningStore {
    pub fn new(
        writer: Arc<dyn ResourceTagWriter>,
        resource_id: impl Into<String>,
        tags: TagSet,
        tag_key: impl Into<String>,
    ) -> Self {
        Self {
            writer,
            resource_id: resource_id.into(),
            tags,
            tag_key: tag_key.into(),
        }
    }
}

#[async_trait]
impl WarningStateStore for TagWarningStore {
    async fn get(&self) -> Option<DateTime<Utc>> {
        let raw = self.tags.get(&self.tag_key)?;
        let parsed = parse_warning_timestamp(raw);
        if parsed.is_none() {
            warn!(
                resource_id = %self.resource_id,
                tag = %self.tag_key,
                value = %raw,
                "Invalid warning timestamp, treating as absent"
            );
        }
        parsed
    }

    async fn set(&mut self, at: DateTime<Utc>) -> Result<(), CloudError> {
        let mut tags = self.tags.clone();
        tags.insert(self.tag_key.clone(), format_warning_timestamp(at));

        self.writer.update_tags(&self.resource_id, &tags).await?;
        self.tags = tags;
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), CloudError> {
        if !self.tags.contains_key(&self.tag_key) {
            return Ok(());
        }

        let mut tags = self.tags.clone();
        tags.remove(&self.tag_key);

        self.writer.update_tags(&self.resource_id, &tags).await?;
        self.tags = tags;
        Ok(())
    }
}

/// In-process warning state, for callers that keep state elsewhere
#[derive(Debug, Default, Clone)]
pub struct MemoryWarningStore {
    warned_at: Option<DateTime<Utc>>,
}

impl MemoryWarningStore {
    pub fn new(warned_at: Option<DateTime<Utc>>) -> Self {
        Self { warned_at }
    }
}

#[async_trait]
impl WarningStateStore for MemoryWarningStore {
    async fn get(&self) -> Option<DateTime<Utc>> {
        self.warned_at
    }

    async fn set(&mut self, at: DateTime<Utc>) -> Result<(), CloudError> {
        self.warned_at = Some(at);
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), CloudError> {
        self.warned_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;

    const KEY: &str = "VM_AUTO_STOP_WARNING_TS";
    const VM_ID: &str = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm";

    fn tick() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(format_warning_timestamp(tick()), "2024-05-01T12:00:00+00:00");
        assert_eq!(parse_warning_timestamp("2024-05-01T12:00:00+00:00"), Some(tick()));
        assert_eq!(parse_warning_timestamp("2024-05-01T14:00:00+02:00"), Some(tick()));
        assert_eq!(parse_warning_timestamp("2024-05-01T12:00:00"), Some(tick()));
        assert!(parse_warning_timestamp("2024-05-01T12:00:00.250000+00:00").is_some());
        assert_eq!(parse_warning_timestamp("yesterday"), None);
    }

    #[tokio::test]
    async fn test_get_ignores_garbage() {
        let cloud = Arc::new(FakeCloud::default());
        let mut tags = TagSet::new();
        tags.insert(KEY.to_string(), "not-a-date".to_string());

        let store = TagWarningStore::new(cloud.clone(), VM_ID, tags, KEY);
        assert_eq!(store.get().await, None);
        assert_eq!(cloud.tag_updates().len(), 0);
    }

    #[tokio::test]
    async fn test_set_writes_full_tag_set() {
        let cloud = Arc::new(FakeCloud::default());
        let mut tags = TagSet::new();
        tags.insert("owner".to_string(), "alice".to_string());

        let mut store = TagWarningStore::new(cloud.clone(), VM_ID, tags, KEY);
        store.set(tick()).await.unwrap();

        let updates = cloud.tag_updates();
        assert_eq!(updates.len(), 1);
        let (resource_id, written) = &updates[0];
        assert_eq!(resource_id, VM_ID);
        assert_eq!(written["owner"], "alice");
        assert_eq!(written[KEY], "2024-05-01T12:00:00+00:00");
        assert_eq!(store.get().await, Some(tick()));
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let cloud = Arc::new(FakeCloud::default());
        let mut store = TagWarningStore::new(cloud.clone(), VM_ID, TagSet::new(), KEY);

        store.delete().await.unwrap();
        assert!(cloud.tag_updates().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_only_warning_tag() {
        let cloud = Arc::new(FakeCloud::default());
        let mut tags = TagSet::new();
        tags.insert("owner".to_string(), "alice".to_string());
        tags.insert(KEY.to_string(), format_warning_timestamp(tick()));

        let mut store = TagWarningStore::new(cloud.clone(), VM_ID, tags, KEY);
        store.delete().await.unwrap();

        let updates = cloud.tag_updates();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].1.contains_key(KEY));
        assert_eq!(updates[0].1["owner"], "alice");
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_local_state() {
        let cloud = Arc::new(FakeCloud::default());
        cloud.fail_tag_updates(true);

        let mut store = TagWarningStore::new(cloud.clone(), VM_ID, TagSet::new(), KEY);
        assert!(store.set(tick()).await.is_err());
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let mut store = MemoryWarningStore::default();
        assert_eq!(store.get().await, None);
        store.set(tick()).await.unwrap();
        assert_eq!(store.get().await, Some(tick()));
        store.delete().await.unwrap();
        assert_eq!(store.get().await, None);
    }
}
