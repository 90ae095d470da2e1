use crate::artifacts::{ArtifactKind, Assignment, Snapshot};

use super::{SnapshotReader, StoreError};

/// A snapshot held in memory, answering lookups by scanning.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: Snapshot,
}

impl MemoryStore {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

impl SnapshotReader for MemoryStore {
    fn group_id_by_name(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .snapshot
            .groups
            .iter()
            .filter(|g| g.display_name == name)
            .map(|g| &g.id)
            .min()
            .cloned())
    }

    fn group_name(&self, group_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .snapshot
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| g.display_name.clone()))
    }

    fn parents_of(&self, child_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(sorted(
            self.snapshot
                .memberships
                .iter()
                .filter(|m| m.child_id == child_id)
                .map(|m| m.parent_id.clone())
                .collect(),
        ))
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(sorted(
            self.snapshot
                .memberships
                .iter()
                .filter(|m| m.parent_id == parent_id)
                .map(|m| m.child_id.clone())
                .collect(),
        ))
    }

    fn artifact_name(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .snapshot
            .artifacts_of(kind)
            .iter()
            .find(|a| a.id == artifact_id)
            .map(|a| a.display_name.clone()))
    }

    fn assignments_to(
        &self,
        kind: ArtifactKind,
        group_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .snapshot
            .assignments_of(kind)
            .iter()
            .filter(|a| a.group_id == group_id)
            .cloned()
            .collect())
    }
}
