//! Assignment aggregation
//!
//! For a target group and its ancestors, collects every assignment edge of an
//! artifact kind and tags it with where it came from. Each (artifact, source
//! group) pair is a separate fact: an app assigned both directly and through
//! an ancestor shows up twice.

use std::collections::HashMap;
use std::fmt;

use crate::artifacts::ArtifactKind;
use crate::store::{SnapshotReader, StoreError};

/// Placeholder for a name that is not in the snapshot
pub const UNKNOWN_NAME: &str = "?";

/// Where an assignment reaches the target group from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Direct,
    Inherited { group_name: String },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Direct => f.write_str("directly assigned"),
            Provenance::Inherited { group_name } => write!(f, "via {group_name}"),
        }
    }
}

/// One reportable assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentLine {
    pub artifact_id: String,
    pub artifact_name: String,
    pub intent: Option<String>,
    pub provenance: Provenance,
}

impl fmt::Display for AssignmentLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "- {} ({})", self.artifact_name, self.artifact_id)?;
        if let Some(intent) = &self.intent {
            write!(f, " [{}]", intent.to_uppercase())?;
        }
        write!(f, " ({})", self.provenance)
    }
}

/// Aggregated assignments of one artifact kind, sorted by rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: ArtifactKind,
    pub lines: Vec<AssignmentLine>,
}

impl Section {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Rendered lines, or the single `None` placeholder when empty
    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        if self.lines.is_empty() {
            vec!["None".to_string()]
        } else {
            self.lines.iter().map(ToString::to_string).collect()
        }
    }
}

/// Collect the assignments of `kind` reaching `target` directly or through
/// any of `ancestors`.
///
/// `ancestors` is expected to be de-duplicated already (see
/// [`crate::hierarchy::ancestors`]). Within one source group an artifact is
/// reported once; when it has several edges there, the last edge's intent wins.
///
/// # Errors
///
/// Returns `StoreError` if the snapshot cannot be queried. Missing names fall
/// back to [`UNKNOWN_NAME`].
pub fn aggregate_kind<R: SnapshotReader + ?Sized>(
    reader: &R,
    kind: ArtifactKind,
    target: &str,
    ancestors: &[String],
) -> Result<Section, StoreError> {
    let mut lines = collect_from(reader, kind, target, &Provenance::Direct)?;

    for ancestor in ancestors {
        if ancestor == target {
            continue;
        }
        let group_name = reader
            .group_name(ancestor)?
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let provenance = Provenance::Inherited { group_name };
        lines.extend(collect_from(reader, kind, ancestor, &provenance)?);
    }

    lines.sort_by_cached_key(ToString::to_string);
    Ok(Section { kind, lines })
}

fn collect_from<R: SnapshotReader + ?Sized>(
    reader: &R,
    kind: ArtifactKind,
    group_id: &str,
    provenance: &Provenance,
) -> Result<Vec<AssignmentLine>, StoreError> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut lines: Vec<AssignmentLine> = Vec::new();
    for assignment in reader.assignments_to(kind, group_id)? {
        let intent = kind.carries_intent().then(|| {
            assignment
                .intent
                .unwrap_or_else(|| UNKNOWN_NAME.to_string())
        });
        if let Some(&index) = position.get(&assignment.artifact_id) {
            lines[index].intent = intent;
            continue;
        }
        let artifact_name = reader
            .artifact_name(kind, &assignment.artifact_id)?
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        position.insert(assignment.artifact_id.clone(), lines.len());
        lines.push(AssignmentLine {
            artifact_id: assignment.artifact_id,
            artifact_name,
            intent,
            provenance: provenance.clone(),
        });
    }
    Ok(lines)
}

/// Aggregate every kind enabled for the feature set, in presentation order.
/// Extended kinds are skipped entirely when `extended` is off.
///
/// # Errors
///
/// Returns `StoreError` if the snapshot cannot be queried.
pub fn aggregate_all<R: SnapshotReader + ?Sized>(
    reader: &R,
    target: &str,
    ancestors: &[String],
    extended: bool,
) -> Result<Vec<Section>, StoreError> {
    ArtifactKind::enabled(extended)
        .map(|kind| aggregate_kind(reader, kind, target, ancestors))
        .collect()
}
