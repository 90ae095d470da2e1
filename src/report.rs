//! Text report for a single group
//!
//! The report model is built from a snapshot and rendered through `Display`;
//! building never fails on missing data, only on storage errors.

use std::fmt;

use crate::aggregate::{self, Section, UNKNOWN_NAME};
use crate::artifacts::ArtifactKind;
use crate::hierarchy::{self, Direction};
use crate::store::{SnapshotReader, StoreError};

const REPEATED_MARKER: &str = "(see above)";
const BUILTIN_APPS_NOTE: &str = "(Office, Edge and possibly other 'built-in' apps are not shown, because the beta API is not enabled.)";

/// A hierarchy print line with its group name resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyLine {
    pub depth: usize,
    pub group_id: String,
    pub group_name: String,
    /// Already listed with its own parents (or members) further up
    pub repeated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub group_id: String,
    pub group_name: String,
    /// Resolved ancestor IDs, de-duplicated
    pub ancestors: Vec<String>,
    /// Resolved descendant IDs, de-duplicated
    pub descendants: Vec<String>,
    pub member_of: Vec<HierarchyLine>,
    pub members: Vec<HierarchyLine>,
    pub sections: Vec<Section>,
    pub extended: bool,
}

impl GroupReport {
    /// Resolve `group_name` and build its report. Returns `None` when no
    /// group with that display name is in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the snapshot cannot be queried.
    pub fn build<R: SnapshotReader + ?Sized>(
        reader: &R,
        group_name: &str,
        extended: bool,
    ) -> Result<Option<Self>, StoreError> {
        let Some(group_id) = reader.group_id_by_name(group_name)? else {
            return Ok(None);
        };

        let ancestors = hierarchy::ancestors(reader, &group_id)?;
        let descendants = hierarchy::descendants(reader, &group_id)?;
        let member_of = named_tree(reader, &group_id, Direction::Ancestors)?;
        let members = named_tree(reader, &group_id, Direction::Descendants)?;
        let sections = aggregate::aggregate_all(reader, &group_id, &ancestors, extended)?;

        Ok(Some(Self {
            group_id,
            group_name: group_name.to_string(),
            ancestors,
            descendants,
            member_of,
            members,
            sections,
            extended,
        }))
    }

    #[must_use]
    pub fn section(&self, kind: ArtifactKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

fn named_tree<R: SnapshotReader + ?Sized>(
    reader: &R,
    group_id: &str,
    direction: Direction,
) -> Result<Vec<HierarchyLine>, StoreError> {
    hierarchy::tree(reader, group_id, direction)?
        .into_iter()
        .map(|line| {
            let group_name = reader
                .group_name(&line.group_id)?
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            Ok(HierarchyLine {
                depth: line.depth,
                group_id: line.group_id,
                group_name,
                repeated: line.repeated,
            })
        })
        .collect()
}

fn section_title(kind: ArtifactKind) -> String {
    if kind.is_extended() {
        format!("{} (via beta API)", kind.title())
    } else {
        kind.title().to_string()
    }
}

fn write_hierarchy(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    lines: &[HierarchyLine],
) -> fmt::Result {
    writeln!(f, "=== {title} ===")?;
    if lines.is_empty() {
        writeln!(f, "None")?;
    }
    for line in lines {
        write!(f, "{} {}", "-".repeat(line.depth), line.group_name)?;
        if line.repeated {
            write!(f, " {REPEATED_MARKER}")?;
        }
        writeln!(f)?;
    }
    writeln!(f)
}

impl fmt::Display for GroupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GROUP NAME:\t{}", self.group_name)?;
        writeln!(f, "ID:\t\t{}", self.group_id)?;
        writeln!(f)?;

        write_hierarchy(f, "MEMBER OF", &self.member_of)?;
        write_hierarchy(f, "MEMBERS", &self.members)?;

        for section in &self.sections {
            writeln!(f, "=== {} ===", section_title(section.kind))?;
            if section.kind == ArtifactKind::App && !self.extended {
                writeln!(f, "{BUILTIN_APPS_NOTE}")?;
            }
            for line in section.rendered() {
                writeln!(f, "{line}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
