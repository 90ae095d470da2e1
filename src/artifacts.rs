//! Artifact kinds and the snapshot data model
//!
//! Every record in a snapshot is identified by the opaque string ID handed out
//! by the remote directory. Groups and their membership edges form the
//! hierarchy; each [`ArtifactKind`] contributes one artifact table and one
//! assignment table.

use std::collections::BTreeMap;
use std::fmt;

/// Which remote API surface serves a given artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Served by the stable (`v1.0`) surface only
    Stable,
    /// Served by both; the extended surface is used when enabled
    Both,
    /// Only available through the extended (`beta`) surface
    Extended,
}

/// The kinds of device-management artifacts that can be assigned to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    App,
    Script,
    DeviceCompliancePolicy,
    ConfigurationPolicy,
    GroupPolicy,
    DeviceConfigurationProfile,
    IntentProfile,
    WindowsDeploymentProfile,
}

impl ArtifactKind {
    /// All kinds, in the order their report sections are presented
    pub const ALL: [ArtifactKind; 8] = [
        ArtifactKind::App,
        ArtifactKind::Script,
        ArtifactKind::DeviceCompliancePolicy,
        ArtifactKind::ConfigurationPolicy,
        ArtifactKind::GroupPolicy,
        ArtifactKind::DeviceConfigurationProfile,
        ArtifactKind::IntentProfile,
        ArtifactKind::WindowsDeploymentProfile,
    ];

    /// Kinds that take part in fetching and aggregation for the given feature set,
    /// in presentation order.
    pub fn enabled(extended: bool) -> impl Iterator<Item = ArtifactKind> {
        Self::ALL
            .into_iter()
            .filter(move |kind| extended || !kind.is_extended())
    }

    #[must_use]
    pub fn surface(self) -> Surface {
        match self {
            ArtifactKind::App => Surface::Both,
            ArtifactKind::DeviceCompliancePolicy | ArtifactKind::DeviceConfigurationProfile => {
                Surface::Stable
            }
            ArtifactKind::Script
            | ArtifactKind::ConfigurationPolicy
            | ArtifactKind::GroupPolicy
            | ArtifactKind::IntentProfile
            | ArtifactKind::WindowsDeploymentProfile => Surface::Extended,
        }
    }

    /// Whether this kind is gated behind the extended feature set
    #[must_use]
    pub fn is_extended(self) -> bool {
        self.surface() == Surface::Extended
    }

    /// Only app assignments carry a deployment intent
    #[must_use]
    pub fn carries_intent(self) -> bool {
        self == ArtifactKind::App
    }

    /// Snapshot table holding the artifacts of this kind
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            ArtifactKind::App => "apps",
            ArtifactKind::Script => "scripts",
            ArtifactKind::DeviceCompliancePolicy => "device_compliance_policies",
            ArtifactKind::ConfigurationPolicy => "configuration_policies",
            ArtifactKind::GroupPolicy => "group_policies",
            ArtifactKind::DeviceConfigurationProfile => "device_configuration_profiles",
            ArtifactKind::IntentProfile => "intent_profiles",
            ArtifactKind::WindowsDeploymentProfile => "windows_deployment_profiles",
        }
    }

    /// Snapshot table holding the assignment edges of this kind
    #[must_use]
    pub fn assignment_table(self) -> &'static str {
        match self {
            ArtifactKind::App => "app_assignments",
            ArtifactKind::Script => "script_assignments",
            ArtifactKind::DeviceCompliancePolicy => "device_compliance_policy_assignments",
            ArtifactKind::ConfigurationPolicy => "configuration_policy_assignments",
            ArtifactKind::GroupPolicy => "group_policy_assignments",
            ArtifactKind::DeviceConfigurationProfile => "device_configuration_profile_assignments",
            ArtifactKind::IntentProfile => "intent_profile_assignments",
            ArtifactKind::WindowsDeploymentProfile => "windows_deployment_profile_assignments",
        }
    }

    /// Collection path relative to the API version root
    #[must_use]
    pub fn collection_path(self) -> &'static str {
        match self {
            ArtifactKind::App => "deviceAppManagement/mobileApps",
            ArtifactKind::Script => "deviceManagement/deviceManagementScripts",
            ArtifactKind::DeviceCompliancePolicy => "deviceManagement/deviceCompliancePolicies",
            ArtifactKind::ConfigurationPolicy => "deviceManagement/configurationPolicies",
            ArtifactKind::GroupPolicy => "deviceManagement/groupPolicyConfigurations",
            ArtifactKind::DeviceConfigurationProfile => "deviceManagement/deviceConfigurations",
            ArtifactKind::IntentProfile => "deviceManagement/intents",
            ArtifactKind::WindowsDeploymentProfile => {
                "deviceManagement/windowsAutopilotDeploymentProfiles"
            }
        }
    }

    /// Field of the remote record that holds the human-readable name
    #[must_use]
    pub fn name_field(self) -> &'static str {
        match self {
            ArtifactKind::ConfigurationPolicy => "name",
            _ => "displayName",
        }
    }

    /// Section heading used by the report
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            ArtifactKind::App => "APPLICATIONS",
            ArtifactKind::Script => "SCRIPTS",
            ArtifactKind::DeviceCompliancePolicy => "DEVICE COMPLIANCE POLICIES",
            ArtifactKind::ConfigurationPolicy => "CONFIGURATION POLICIES",
            ArtifactKind::GroupPolicy => "GROUP POLICIES",
            ArtifactKind::DeviceConfigurationProfile => "DEVICE CONFIGURATION PROFILES",
            ArtifactKind::IntentProfile => "INTENT PROFILES",
            ArtifactKind::WindowsDeploymentProfile => "WINDOWS DEPLOYMENT PROFILES",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A directory group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub display_name: String,
}

/// `parent_id` contains `child_id` as a group-typed member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub parent_id: String,
    pub child_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub display_name: String,
}

/// An artifact assigned to a group. Only app assignments carry an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub artifact_id: String,
    pub group_id: String,
    pub intent: Option<String>,
}

/// Describes how and when a snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Unix timestamp (seconds) of the refresh
    pub refreshed_at: u64,
    pub group_prefix: String,
    pub extended: bool,
}

/// A complete, immutable copy of the remote data, replaced wholesale on refresh
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub groups: Vec<Group>,
    pub memberships: Vec<Membership>,
    pub artifacts: BTreeMap<ArtifactKind, Vec<Artifact>>,
    pub assignments: BTreeMap<ArtifactKind, Vec<Assignment>>,
}

impl Snapshot {
    #[must_use]
    pub fn artifacts_of(&self, kind: ArtifactKind) -> &[Artifact] {
        self.artifacts.get(&kind).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn assignments_of(&self, kind: ArtifactKind) -> &[Assignment] {
        self.assignments.get(&kind).map_or(&[], Vec::as_slice)
    }
}
