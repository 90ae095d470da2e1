//! Full snapshot refresh
//!
//! Everything is fetched into an in-memory [`Snapshot`] first; the store is
//! only touched once every remote call has succeeded, and then replaced in a
//! single transaction. An aborted refresh therefore leaves the previous
//! snapshot intact.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::artifacts::{
    Artifact, ArtifactKind, Assignment, Group, Membership, Snapshot, SnapshotMeta,
};
use crate::config_file::Settings;
use crate::graph_api::{FetchError, RemoteSource, Resource};
use crate::store::{SqliteStore, StoreError};

const GROUP_ODATA_TYPE: &str = "#microsoft.graph.group";

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Unable to write snapshot: {0}")]
    Store(#[from] StoreError),
}

/// What a snapshot covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub group_prefix: String,
    pub extended: bool,
}

impl From<&Settings> for Scope {
    fn from(settings: &Settings) -> Self {
        Scope {
            group_prefix: settings.group_prefix.clone(),
            extended: settings.extended,
        }
    }
}

impl Scope {
    fn groups_resource(&self) -> Resource {
        Resource::Groups {
            prefix: (!self.group_prefix.is_empty()).then(|| self.group_prefix.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteGroup {
    id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteMember {
    id: String,
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTarget {
    group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteAssignment {
    target: Option<RemoteTarget>,
    intent: Option<String>,
}

/// Decode one record, logging and skipping it if malformed
fn decode<T: DeserializeOwned>(resource: &Resource, record: Value) -> Option<T> {
    match serde_json::from_value(record) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Skipping malformed record from {resource}: {e}");
            None
        }
    }
}

fn decode_artifact(kind: ArtifactKind, record: &Value) -> Option<Artifact> {
    let Some(id) = record.get("id").and_then(Value::as_str) else {
        warn!("Skipping {kind} record without id");
        return None;
    };
    let display_name = record
        .get(kind.name_field())
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(Artifact {
        id: id.to_string(),
        display_name: display_name.to_string(),
    })
}

async fn fetch_groups<S: RemoteSource + ?Sized>(
    source: &S,
    scope: &Scope,
) -> Result<Vec<Group>, FetchError> {
    let resource = scope.groups_resource();
    let groups: Vec<Group> = source
        .list(&resource)
        .await?
        .into_iter()
        .filter_map(|record| decode::<RemoteGroup>(&resource, record))
        .map(|g| Group {
            id: g.id,
            display_name: g.display_name.unwrap_or_default(),
        })
        .collect();
    info!("Fetched {} groups", groups.len());
    Ok(groups)
}

async fn fetch_memberships<S: RemoteSource + ?Sized>(
    source: &S,
    groups: &[Group],
) -> Result<Vec<Membership>, FetchError> {
    let mut memberships = Vec::new();
    for group in groups {
        let resource = Resource::GroupMembers {
            group_id: group.id.clone(),
        };
        for record in source.list(&resource).await? {
            let Some(member) = decode::<RemoteMember>(&resource, record) else {
                continue;
            };
            if member.odata_type.as_deref() == Some(GROUP_ODATA_TYPE) {
                memberships.push(Membership {
                    parent_id: group.id.clone(),
                    child_id: member.id,
                });
            }
        }
    }
    info!("Fetched {} group memberships", memberships.len());
    Ok(memberships)
}

async fn fetch_kind<S: RemoteSource + ?Sized>(
    source: &S,
    kind: ArtifactKind,
) -> Result<(Vec<Artifact>, Vec<Assignment>), FetchError> {
    let artifacts: Vec<Artifact> = source
        .list(&Resource::Artifacts(kind))
        .await?
        .iter()
        .filter_map(|record| decode_artifact(kind, record))
        .collect();

    let mut assignments = Vec::new();
    for artifact in &artifacts {
        let resource = Resource::Assignments {
            kind,
            artifact_id: artifact.id.clone(),
        };
        for record in source.list(&resource).await? {
            let Some(assignment) = decode::<RemoteAssignment>(&resource, record) else {
                continue;
            };
            let Some(group_id) = assignment.target.and_then(|t| t.group_id) else {
                debug!(
                    "Skipping {kind} assignment of {} without a group target",
                    artifact.id
                );
                continue;
            };
            assignments.push(Assignment {
                artifact_id: artifact.id.clone(),
                group_id,
                intent: if kind.carries_intent() {
                    assignment.intent
                } else {
                    None
                },
            });
        }
    }
    info!(
        "Fetched {} {kind} with {} assignments",
        artifacts.len(),
        assignments.len()
    );
    Ok((artifacts, assignments))
}

/// Fetch a complete snapshot. Remote calls are made one at a time.
///
/// # Errors
///
/// Returns the first `FetchError` encountered; nothing is retained in that case.
pub async fn fetch_snapshot<S: RemoteSource + ?Sized>(
    source: &S,
    scope: &Scope,
) -> Result<Snapshot, FetchError> {
    let groups = fetch_groups(source, scope).await?;
    let memberships = fetch_memberships(source, &groups).await?;

    let mut snapshot = Snapshot {
        groups,
        memberships,
        ..Default::default()
    };
    for kind in ArtifactKind::enabled(scope.extended) {
        let (artifacts, assignments) = fetch_kind(source, kind).await?;
        snapshot.artifacts.insert(kind, artifacts);
        snapshot.assignments.insert(kind, assignments);
    }
    Ok(snapshot)
}

/// Fetch a fresh snapshot and replace the store contents with it.
///
/// # Errors
///
/// Returns `RefreshError::Fetch` if any remote call fails (the store is left
/// untouched) or `RefreshError::Store` if the replace transaction fails.
pub async fn refresh<S: RemoteSource + ?Sized>(
    source: &S,
    store: &mut SqliteStore,
    scope: &Scope,
) -> Result<SnapshotMeta, RefreshError> {
    let snapshot = fetch_snapshot(source, scope).await?;
    let meta = SnapshotMeta {
        refreshed_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        group_prefix: scope.group_prefix.clone(),
        extended: scope.extended,
    };
    store.replace_snapshot(&snapshot, &meta)?;
    info!("Snapshot replaced ({} groups)", snapshot.groups.len());
    Ok(meta)
}

/// Whether the stored snapshot cannot serve `scope` at all: no refresh ever
/// completed, or the extended kinds are wanted but were never fetched.
#[must_use]
pub fn refresh_required(meta: Option<&SnapshotMeta>, scope: &Scope) -> bool {
    match meta {
        None => true,
        Some(meta) => scope.extended && !meta.extended,
    }
}

/// Ways in which a usable snapshot does not match the current scope
#[must_use]
pub fn stale_reasons(meta: &SnapshotMeta, scope: &Scope) -> Vec<String> {
    let mut reasons = Vec::new();
    if meta.group_prefix != scope.group_prefix {
        reasons.push(format!(
            "snapshot was taken with group prefix '{}', current prefix is '{}'",
            meta.group_prefix, scope.group_prefix
        ));
    }
    if meta.extended && !scope.extended {
        reasons.push("snapshot includes beta API data, which is now disabled".to_string());
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_api::MockSource;
    use crate::store::SnapshotReader;
    use serde_json::json;

    fn scope(extended: bool) -> Scope {
        Scope {
            group_prefix: "LAB-".to_string(),
            extended,
        }
    }

    fn groups() -> Resource {
        Resource::Groups {
            prefix: Some("LAB-".to_string()),
        }
    }

    fn members(group_id: &str) -> Resource {
        Resource::GroupMembers {
            group_id: group_id.to_string(),
        }
    }

    fn assignments(kind: ArtifactKind, artifact_id: &str) -> Resource {
        Resource::Assignments {
            kind,
            artifact_id: artifact_id.to_string(),
        }
    }

    fn source() -> MockSource {
        MockSource::new()
            .with(
                groups(),
                vec![
                    json!({"id": "g1", "displayName": "LAB-Engineering"}),
                    json!({"id": "g2", "displayName": "LAB-AllStaff"}),
                ],
            )
            .with(
                members("g2"),
                vec![
                    json!({"@odata.type": "#microsoft.graph.group", "id": "g1"}),
                    json!({"@odata.type": "#microsoft.graph.user", "id": "u1"}),
                    json!({"@odata.type": "#microsoft.graph.device", "id": "d1"}),
                ],
            )
            .with(
                Resource::Artifacts(ArtifactKind::App),
                vec![json!({"id": "a1", "displayName": "AppX"})],
            )
            .with(
                assignments(ArtifactKind::App, "a1"),
                vec![
                    json!({"intent": "required", "target": {"groupId": "g2"}}),
                    json!({"intent": "available", "target": {"@odata.type": "#microsoft.graph.allDevicesAssignmentTarget"}}),
                    json!({"intent": "required"}),
                ],
            )
            .with(
                Resource::Artifacts(ArtifactKind::ConfigurationPolicy),
                vec![json!({"id": "c1", "name": "Baseline", "displayName": "ignored"})],
            )
            .with(
                assignments(ArtifactKind::ConfigurationPolicy, "c1"),
                vec![json!({"target": {"groupId": "g1"}, "intent": "stray"})],
            )
    }

    #[tokio::test]
    async fn test_fetch_keeps_only_group_members() {
        let snapshot = fetch_snapshot(&source(), &scope(true)).await.unwrap();
        assert_eq!(snapshot.groups.len(), 2);
        assert_eq!(
            snapshot.memberships,
            vec![Membership {
                parent_id: "g2".to_string(),
                child_id: "g1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_skips_assignments_without_group() {
        let snapshot = fetch_snapshot(&source(), &scope(true)).await.unwrap();
        assert_eq!(
            snapshot.assignments_of(ArtifactKind::App),
            &[Assignment {
                artifact_id: "a1".to_string(),
                group_id: "g2".to_string(),
                intent: Some("required".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_configuration_policy_named_by_name_field_and_no_intent() {
        let snapshot = fetch_snapshot(&source(), &scope(true)).await.unwrap();
        let policies = snapshot.artifacts_of(ArtifactKind::ConfigurationPolicy);
        assert_eq!(policies[0].display_name, "Baseline");
        let edges = snapshot.assignments_of(ArtifactKind::ConfigurationPolicy);
        assert_eq!(edges[0].intent, None);
    }

    #[tokio::test]
    async fn test_stable_only_never_requests_extended_kinds() {
        let source = source();
        let snapshot = fetch_snapshot(&source, &scope(false)).await.unwrap();
        assert!(
            snapshot
                .artifacts_of(ArtifactKind::ConfigurationPolicy)
                .is_empty()
        );
        assert!(source.calls().iter().all(|resource| match resource {
            Resource::Artifacts(kind) | Resource::Assignments { kind, .. } => !kind.is_extended(),
            _ => true,
        }));
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let source = MockSource::new().with(
            Resource::Groups { prefix: None },
            vec![json!({"displayName": "no id"}), json!({"id": "g1"})],
        );
        let scope = Scope {
            group_prefix: String::new(),
            extended: false,
        };
        let snapshot = fetch_snapshot(&source, &scope).await.unwrap();
        assert_eq!(
            snapshot.groups,
            vec![Group {
                id: "g1".to_string(),
                display_name: String::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_refresh_writes_store_and_meta() {
        let mut store = SqliteStore::in_memory().unwrap();
        let meta = refresh(&source(), &mut store, &scope(true)).await.unwrap();
        assert_eq!(store.meta().unwrap(), Some(meta));
        assert_eq!(
            store.group_id_by_name("LAB-Engineering").unwrap().as_deref(),
            Some("g1")
        );
        assert_eq!(store.parents_of("g1").unwrap(), vec!["g2".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let mut store = SqliteStore::in_memory().unwrap();
        let first = refresh(&source(), &mut store, &scope(true)).await.unwrap();

        let failing = source().failing_on(assignments(ArtifactKind::App, "a1"));
        let result = refresh(&failing, &mut store, &scope(true)).await;
        assert!(matches!(
            result,
            Err(RefreshError::Fetch(FetchError::Status { status: 503, .. }))
        ));
        assert_eq!(store.meta().unwrap(), Some(first));
        assert_eq!(
            store.group_name("g2").unwrap().as_deref(),
            Some("LAB-AllStaff")
        );
    }

    #[test]
    fn test_refresh_required_without_meta_or_beta_data() {
        let stable = SnapshotMeta {
            refreshed_at: 0,
            group_prefix: "LAB-".to_string(),
            extended: false,
        };
        assert!(refresh_required(None, &scope(false)));
        assert!(refresh_required(Some(&stable), &scope(true)));
        assert!(!refresh_required(Some(&stable), &scope(false)));

        let extended = SnapshotMeta {
            extended: true,
            ..stable
        };
        assert!(!refresh_required(Some(&extended), &scope(false)));
        assert!(!refresh_required(Some(&extended), &scope(true)));
    }

    #[test]
    fn test_stale_reasons() {
        let meta = SnapshotMeta {
            refreshed_at: 0,
            group_prefix: "LAB-".to_string(),
            extended: true,
        };
        assert!(stale_reasons(&meta, &scope(true)).is_empty());

        let changed = Scope {
            group_prefix: "OPS-".to_string(),
            extended: false,
        };
        let reasons = stale_reasons(&meta, &changed);
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("'OPS-'"));
    }
}
