use intune_explorer::artifacts::{
    ArtifactKind, Assignment, Group, Membership, Snapshot, SnapshotMeta,
};
use intune_explorer::config_file::ConfigError;
use intune_explorer::graph_api::{MockSource, Resource};
use intune_explorer::refresh::{self, Scope};
use intune_explorer::report::GroupReport;
use intune_explorer::store::{SnapshotReader, SqliteStore};
use intune_explorer::{hierarchy, load_settings_with};
use serde_json::{Value, json};

fn scope(extended: bool) -> Scope {
    Scope {
        group_prefix: String::new(),
        extended,
    }
}

fn groups(records: Vec<Value>) -> (Resource, Vec<Value>) {
    (Resource::Groups { prefix: None }, records)
}

fn group_members(parent: &str, children: &[&str]) -> (Resource, Vec<Value>) {
    (
        Resource::GroupMembers {
            group_id: parent.to_string(),
        },
        children
            .iter()
            .map(|id| json!({"@odata.type": "#microsoft.graph.group", "id": id}))
            .collect(),
    )
}

fn app_assignments(app_id: &str, targets: &[(&str, &str)]) -> (Resource, Vec<Value>) {
    (
        Resource::Assignments {
            kind: ArtifactKind::App,
            artifact_id: app_id.to_string(),
        },
        targets
            .iter()
            .map(|(group, intent)| json!({"intent": intent, "target": {"groupId": group}}))
            .collect(),
    )
}

fn mock(entries: Vec<(Resource, Vec<Value>)>) -> MockSource {
    entries
        .into_iter()
        .fold(MockSource::new(), |source, (resource, records)| {
            source.with(resource, records)
        })
}

/// Engineering (g1) is a member of AllStaff (g2); AppX is assigned to AllStaff.
fn engineering_source(extra_targets: &[(&str, &str)]) -> MockSource {
    let mut targets = vec![("g2", "required")];
    targets.extend_from_slice(extra_targets);
    mock(vec![
        groups(vec![
            json!({"id": "g1", "displayName": "Engineering"}),
            json!({"id": "g2", "displayName": "AllStaff"}),
        ]),
        group_members("g2", &["g1"]),
        (
            Resource::Artifacts(ArtifactKind::App),
            vec![json!({"id": "app-x", "displayName": "AppX"})],
        ),
        app_assignments("app-x", &targets),
    ])
}

async fn refreshed_store(
    dir: &tempfile::TempDir,
    source: &MockSource,
    extended: bool,
) -> SqliteStore {
    let mut store = SqliteStore::open(&dir.path().join("cache.db")).unwrap();
    refresh::refresh(source, &mut store, &scope(extended))
        .await
        .unwrap();
    store
}

fn app_lines(report: &GroupReport) -> Vec<String> {
    report.section(ArtifactKind::App).unwrap().rendered()
}

#[tokio::test]
async fn test_inherited_app_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let store = refreshed_store(&dir, &engineering_source(&[]), true).await;

    let report = GroupReport::build(&store, "Engineering", true)
        .unwrap()
        .unwrap();
    assert_eq!(report.ancestors, vec!["g2".to_string()]);
    assert_eq!(report.member_of[0].group_name, "AllStaff");
    assert_eq!(
        app_lines(&report),
        vec!["- AppX (app-x) [REQUIRED] (via AllStaff)".to_string()]
    );
}

#[tokio::test]
async fn test_direct_and_inherited_lines_are_both_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = refreshed_store(&dir, &engineering_source(&[("g1", "available")]), true).await;

    let report = GroupReport::build(&store, "Engineering", true)
        .unwrap()
        .unwrap();
    assert_eq!(
        app_lines(&report),
        vec![
            "- AppX (app-x) [AVAILABLE] (directly assigned)".to_string(),
            "- AppX (app-x) [REQUIRED] (via AllStaff)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_group_without_anything_prints_none() {
    let dir = tempfile::tempdir().unwrap();
    let source = mock(vec![groups(vec![json!({"id": "g9", "displayName": "Island"})])]);
    let store = refreshed_store(&dir, &source, true).await;

    let report = GroupReport::build(&store, "Island", true).unwrap().unwrap();
    insta::assert_snapshot!(report.to_string().trim_end(), @r"
    GROUP NAME:	Island
    ID:		g9

    === MEMBER OF ===
    None

    === MEMBERS ===
    None

    === APPLICATIONS ===
    None

    === SCRIPTS (via beta API) ===
    None

    === DEVICE COMPLIANCE POLICIES ===
    None

    === CONFIGURATION POLICIES (via beta API) ===
    None

    === GROUP POLICIES (via beta API) ===
    None

    === DEVICE CONFIGURATION PROFILES ===
    None

    === INTENT PROFILES (via beta API) ===
    None

    === WINDOWS DEPLOYMENT PROFILES (via beta API) ===
    None
    ");
}

#[tokio::test]
async fn test_extended_kinds_absent_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let source = mock(vec![
        groups(vec![json!({"id": "g1", "displayName": "Engineering"})]),
        (
            Resource::Artifacts(ArtifactKind::Script),
            vec![json!({"id": "s1", "displayName": "Cleanup.ps1"})],
        ),
        (
            Resource::Assignments {
                kind: ArtifactKind::Script,
                artifact_id: "s1".to_string(),
            },
            vec![json!({"target": {"groupId": "g1"}})],
        ),
    ]);
    let store = refreshed_store(&dir, &source, false).await;

    let report = GroupReport::build(&store, "Engineering", false)
        .unwrap()
        .unwrap();
    let text = report.to_string();
    assert!(!text.contains("SCRIPTS"));
    assert!(!text.contains("Cleanup.ps1"));
    assert!(text.contains("'built-in' apps are not shown"));
    assert!(report.section(ArtifactKind::Script).is_none());
}

#[tokio::test]
async fn test_membership_cycle_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let source = mock(vec![
        groups(vec![
            json!({"id": "a", "displayName": "A"}),
            json!({"id": "b", "displayName": "B"}),
        ]),
        group_members("a", &["b"]),
        group_members("b", &["a"]),
    ]);
    let store = refreshed_store(&dir, &source, true).await;

    assert_eq!(
        hierarchy::ancestors(&store, "a").unwrap(),
        vec!["b".to_string()]
    );
    assert_eq!(
        hierarchy::descendants(&store, "a").unwrap(),
        vec!["b".to_string()]
    );
    let report = GroupReport::build(&store, "A", true).unwrap().unwrap();
    assert!(!report.member_of.is_empty());
}

#[tokio::test]
async fn test_two_paths_to_same_ancestor_counted_once() {
    // g1 is in g2 and g3, both of which are in g4
    let dir = tempfile::tempdir().unwrap();
    let source = mock(vec![
        groups(vec![
            json!({"id": "g1", "displayName": "Team"}),
            json!({"id": "g2", "displayName": "Dept"}),
            json!({"id": "g3", "displayName": "Site"}),
            json!({"id": "g4", "displayName": "Company"}),
        ]),
        group_members("g2", &["g1"]),
        group_members("g3", &["g1"]),
        group_members("g4", &["g2", "g3"]),
        (
            Resource::Artifacts(ArtifactKind::App),
            vec![json!({"id": "app-x", "displayName": "AppX"})],
        ),
        app_assignments("app-x", &[("g4", "required"), ("g1", "required")]),
    ]);
    let store = refreshed_store(&dir, &source, true).await;

    let report = GroupReport::build(&store, "Team", true).unwrap().unwrap();
    assert_eq!(report.ancestors.len(), 3);
    assert_eq!(
        app_lines(&report),
        vec![
            "- AppX (app-x) [REQUIRED] (directly assigned)".to_string(),
            "- AppX (app-x) [REQUIRED] (via Company)".to_string(),
        ]
    );
}

#[test]
fn test_unknown_artifact_and_group_names_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("cache.db")).unwrap();

    let mut snapshot = Snapshot {
        groups: vec![Group {
            id: "g1".to_string(),
            display_name: "Engineering".to_string(),
        }],
        // g-gone contains g1 but was not part of the fetched groups
        memberships: vec![Membership {
            parent_id: "g-gone".to_string(),
            child_id: "g1".to_string(),
        }],
        ..Default::default()
    };
    snapshot.assignments.insert(
        ArtifactKind::DeviceCompliancePolicy,
        vec![
            Assignment {
                artifact_id: "p-missing".to_string(),
                group_id: "g1".to_string(),
                intent: None,
            },
            Assignment {
                artifact_id: "p-missing".to_string(),
                group_id: "g-gone".to_string(),
                intent: None,
            },
        ],
    );
    let meta = SnapshotMeta {
        refreshed_at: 0,
        group_prefix: String::new(),
        extended: false,
    };
    store.replace_snapshot(&snapshot, &meta).unwrap();

    let report = GroupReport::build(&store, "Engineering", false)
        .unwrap()
        .unwrap();
    assert_eq!(report.member_of[0].group_name, "?");
    assert_eq!(
        report
            .section(ArtifactKind::DeviceCompliancePolicy)
            .unwrap()
            .rendered(),
        vec![
            "- ? (p-missing) (directly assigned)".to_string(),
            "- ? (p-missing) (via ?)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_aggregation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = refreshed_store(&dir, &engineering_source(&[("g1", "available")]), true).await;

    let first = GroupReport::build(&store, "Engineering", true).unwrap();
    let second = GroupReport::build(&store, "Engineering", true).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let meta = {
        let store = refreshed_store(&dir, &engineering_source(&[]), true).await;
        store.meta().unwrap().unwrap()
    };

    let reopened = SqliteStore::open(&dir.path().join("cache.db")).unwrap();
    assert_eq!(reopened.meta().unwrap(), Some(meta));
    assert_eq!(
        reopened.group_id_by_name("AllStaff").unwrap().as_deref(),
        Some("g2")
    );
    let stored = reopened.meta().unwrap().unwrap();
    assert_eq!(refresh::stale_reasons(&stored, &scope(false)).len(), 1);
}

#[test]
fn test_settings_from_file_feed_scope() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".intune-explorer.yaml");
    std::fs::write(
        &path,
        "tenant_id: t\nclient_id: c\nclient_secret: s\ngroup_prefix: LAB-\nextended: false\n",
    )
    .unwrap();

    let settings = load_settings_with(Some(&path.to_string_lossy()), |_| None).unwrap();
    assert_eq!(
        Scope::from(&settings),
        Scope {
            group_prefix: "LAB-".to_string(),
            extended: false,
        }
    );
}

#[test]
fn test_settings_require_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".intune-explorer.json");
    std::fs::write(&path, r#"{"tenant_id": "t", "client_id": "c"}"#).unwrap();

    match load_settings_with(Some(&path.to_string_lossy()), |_| None) {
        Err(ConfigError::Validation(msg)) => assert!(msg.contains("client_secret")),
        other => panic!("Expected Validation error, got: {other:?}"),
    }
}
