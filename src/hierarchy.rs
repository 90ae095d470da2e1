//! Group hierarchy resolution
//!
//! Membership edges form a general directed graph: nothing prevents a group
//! from (transitively) containing itself. Every traversal here keeps a visited
//! set so that a cycle ends the walk instead of looping forever.

use std::collections::HashSet;

use crate::store::{SnapshotReader, StoreError};

/// Which way to follow membership edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a member to the groups that contain it
    Ancestors,
    /// From a group to its group-typed members
    Descendants,
}

impl Direction {
    fn neighbours<R: SnapshotReader + ?Sized>(
        self,
        reader: &R,
        group_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        match self {
            Direction::Ancestors => reader.parents_of(group_id),
            Direction::Descendants => reader.children_of(group_id),
        }
    }
}

/// One line of a hierarchy print: `depth` is 1 for direct neighbours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    pub group_id: String,
    /// The group was already expanded earlier in the print; its own
    /// neighbours are not listed again
    pub repeated: bool,
}

/// All groups that directly or transitively contain `group_id`.
///
/// The result is de-duplicated, in depth-first discovery order, and never
/// contains `group_id` itself, even when it lies on a membership cycle. An
/// unknown group yields an empty list.
///
/// # Errors
///
/// Returns `StoreError` if the snapshot cannot be queried.
pub fn ancestors<R: SnapshotReader + ?Sized>(
    reader: &R,
    group_id: &str,
) -> Result<Vec<String>, StoreError> {
    closure(reader, group_id, Direction::Ancestors)
}

/// All groups directly or transitively contained in `group_id`, with the same
/// guarantees as [`ancestors`].
///
/// # Errors
///
/// Returns `StoreError` if the snapshot cannot be queried.
pub fn descendants<R: SnapshotReader + ?Sized>(
    reader: &R,
    group_id: &str,
) -> Result<Vec<String>, StoreError> {
    closure(reader, group_id, Direction::Descendants)
}

/// Iterative depth-first walk with a global visited set.
///
/// # Errors
///
/// Returns `StoreError` if the snapshot cannot be queried.
pub fn closure<R: SnapshotReader + ?Sized>(
    reader: &R,
    start: &str,
    direction: Direction,
) -> Result<Vec<String>, StoreError> {
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut found = Vec::new();

    // Neighbours are pushed in reverse so the lowest ID is explored first
    let mut stack: Vec<String> = direction.neighbours(reader, start)?;
    stack.reverse();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let mut next = direction.neighbours(reader, &current)?;
        next.retain(|id| !visited.contains(id));
        next.reverse();
        stack.extend(next);
        found.push(current);
    }

    Ok(found)
}

/// Discovery tree for a hierarchy print.
///
/// A group reachable along several branches is listed under each of them,
/// but only the first occurrence is expanded; later ones are marked
/// `repeated`. This keeps the print linear in the number of edges. A group
/// already on the current path (including the start group) is skipped.
///
/// # Errors
///
/// Returns `StoreError` if the snapshot cannot be queried.
pub fn tree<R: SnapshotReader + ?Sized>(
    reader: &R,
    start: &str,
    direction: Direction,
) -> Result<Vec<TreeLine>, StoreError> {
    let mut lines = Vec::new();
    let mut path = vec![start.to_string()];
    let mut expanded = HashSet::new();
    walk_tree(reader, direction, &mut path, &mut expanded, &mut lines)?;
    Ok(lines)
}

fn walk_tree<R: SnapshotReader + ?Sized>(
    reader: &R,
    direction: Direction,
    path: &mut Vec<String>,
    expanded: &mut HashSet<String>,
    lines: &mut Vec<TreeLine>,
) -> Result<(), StoreError> {
    let Some(current) = path.last() else {
        return Ok(());
    };
    for next in direction.neighbours(reader, current)? {
        if path.contains(&next) {
            continue;
        }
        let repeated = !expanded.insert(next.clone());
        lines.push(TreeLine {
            depth: path.len(),
            group_id: next.clone(),
            repeated,
        });
        if repeated {
            continue;
        }
        path.push(next);
        walk_tree(reader, direction, path, expanded, lines)?;
        path.pop();
    }
    Ok(())
}
