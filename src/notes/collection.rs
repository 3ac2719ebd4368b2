use std::collections::HashSet;

use indexmap::IndexMap;
use strum::{Display, EnumIter};

use crate::notes::{Note, NoteId};

/// Display sections of the dashboard, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Group {
    #[strum(serialize = "Pinned")]
    Pinned,
    #[strum(serialize = "Notes")]
    Unpinned,
    #[strum(serialize = "Archived")]
    Archived,
}

impl Group {
    pub fn of(note: &Note) -> Self {
        if note.archived {
            Group::Archived
        } else if note.pinned {
            Group::Pinned
        } else {
            Group::Unpinned
        }
    }
}

/// A position inside one dashboard section, as produced by a drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSlot {
    pub group: Group,
    pub index: usize,
}

impl DragSlot {
    pub fn new(group: Group, index: usize) -> Self {
        Self { group, index }
    }
}

#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub pinned: Vec<&'a Note>,
    pub unpinned: Vec<&'a Note>,
    pub archived: Vec<&'a Note>,
}

impl<'a> Partition<'a> {
    pub fn group(&self, group: Group) -> &[&'a Note] {
        match group {
            Group::Pinned => &self.pinned,
            Group::Unpinned => &self.unpinned,
            Group::Archived => &self.archived,
        }
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.unpinned.len() + self.archived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pinned, then the user-ordered notes, then archived when requested.
    pub fn display_order(&self, show_archived: bool) -> Vec<&'a Note> {
        let mut ordered = Vec::with_capacity(self.len());
        ordered.extend(self.pinned.iter().copied());
        ordered.extend(self.unpinned.iter().copied());
        if show_archived {
            ordered.extend(self.archived.iter().copied());
        }
        ordered
    }
}

/// Notes whose title or body contains `term`, ignoring case. A blank term keeps everything.
pub fn filter<'a, I>(notes: I, term: &str) -> Vec<&'a Note>
where
    I: IntoIterator<Item = &'a Note>,
{
    if term.trim().is_empty() {
        return notes.into_iter().collect();
    }
    let needle = term.to_lowercase();
    notes
        .into_iter()
        .filter(|note| note.matches(&needle))
        .collect()
}

pub fn partition<'a>(view: &[&'a Note]) -> Partition<'a> {
    let mut groups = Partition::default();
    for &note in view {
        match Group::of(note) {
            Group::Pinned => groups.pinned.push(note),
            Group::Unpinned => groups.unpinned.push(note),
            Group::Archived => groups.archived.push(note),
        }
    }
    groups
}

/// The signed-in user's notes plus the dashboard's view state.
#[derive(Debug, Clone, Default)]
pub struct NoteCollection {
    notes: IndexMap<NoteId, Note>,
    search_term: String,
    editing: Option<NoteId>,
    viewing: Option<NoteId>,
    show_archived: bool,
}

impl NoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_notes(notes: Vec<Note>) -> Self {
        let mut collection = Self::default();
        collection.replace_all(notes);
        collection
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.notes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn ids(&self) -> Vec<NoteId> {
        self.notes.keys().cloned().collect()
    }

    /// Swaps in a fresh server listing. Duplicate ids keep their first occurrence.
    pub fn replace_all(&mut self, notes: Vec<Note>) {
        let mut next = IndexMap::with_capacity(notes.len());
        for note in notes {
            if next.contains_key(&note.id) {
                tracing::warn!(id = %note.id, "dropping duplicate note id from listing");
                continue;
            }
            next.insert(note.id.clone(), note);
        }
        self.notes = next;
        self.drop_dangling_refs();
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.search_term.clear();
        self.editing = None;
        self.viewing = None;
    }

    pub fn remove(&mut self, id: &NoteId) -> Option<Note> {
        let removed = self.notes.shift_remove(id);
        self.drop_dangling_refs();
        removed
    }

    pub fn flip_pinned(&mut self, id: &NoteId) -> bool {
        match self.notes.get_mut(id) {
            Some(note) => {
                note.pinned = !note.pinned;
                true
            }
            None => false,
        }
    }

    pub fn flip_archived(&mut self, id: &NoteId) -> bool {
        match self.notes.get_mut(id) {
            Some(note) => {
                note.archived = !note.archived;
                true
            }
            None => false,
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn show_archived(&self) -> bool {
        self.show_archived
    }

    pub fn set_show_archived(&mut self, show: bool) {
        self.show_archived = show;
    }

    pub fn toggle_show_archived(&mut self) -> bool {
        self.show_archived = !self.show_archived;
        self.show_archived
    }

    pub fn editing(&self) -> Option<&NoteId> {
        self.editing.as_ref()
    }

    pub fn set_editing(&mut self, id: Option<NoteId>) {
        self.editing = id.filter(|id| self.notes.contains_key(id));
    }

    pub fn viewing(&self) -> Option<&Note> {
        self.viewing.as_ref().and_then(|id| self.notes.get(id))
    }

    pub fn set_viewing(&mut self, id: Option<NoteId>) {
        self.viewing = id.filter(|id| self.notes.contains_key(id));
    }

    pub fn filtered(&self) -> Vec<&Note> {
        filter(self.notes.values(), &self.search_term)
    }

    pub fn partitioned(&self) -> Partition<'_> {
        partition(&self.filtered())
    }

    pub fn visible(&self) -> Vec<&Note> {
        self.partitioned().display_order(self.show_archived)
    }

    /// Where a note currently sits in the filtered dashboard.
    pub fn slot_of(&self, id: &NoteId) -> Option<DragSlot> {
        let partition = self.partitioned();
        let note = self.notes.get(id)?;
        let group = Group::of(note);
        partition
            .group(group)
            .iter()
            .position(|candidate| &candidate.id == id)
            .map(|index| DragSlot::new(group, index))
    }

    /// Ids of the reorderable subset (neither pinned nor archived), search ignored.
    pub fn reorderable_ids(&self) -> Vec<NoteId> {
        self.notes
            .values()
            .filter(|note| note.is_reorderable())
            .map(|note| note.id.clone())
            .collect()
    }

    /// Translates a drag between two visible slots into a full ordering of the
    /// reorderable subset. Slots outside the unpinned section yield `None`.
    pub fn plan_move(&self, source: DragSlot, destination: DragSlot) -> Option<Vec<NoteId>> {
        if source.group != Group::Unpinned || destination.group != Group::Unpinned {
            return None;
        }
        if source.index == destination.index {
            return None;
        }
        let partition = self.partitioned();
        let moved = partition.unpinned.get(source.index)?.id.clone();
        let anchor = partition.unpinned.get(destination.index)?.id.clone();

        let mut order = self.reorderable_ids();
        order.retain(|id| id != &moved);
        let anchor_pos = order.iter().position(|id| id == &anchor)?;
        let insert_at = if destination.index > source.index {
            anchor_pos + 1
        } else {
            anchor_pos
        };
        order.insert(insert_at, moved);
        Some(order)
    }

    /// Rebuilds the list as pinned, `ordered`, archived. Returns `false` and
    /// leaves the list alone unless `ordered` is a permutation of the
    /// reorderable subset.
    pub fn apply_order(&mut self, ordered: &[NoteId]) -> bool {
        let current = self.reorderable_ids();
        if ordered.len() != current.len() {
            return false;
        }
        let expected: HashSet<&NoteId> = current.iter().collect();
        let mut seen = HashSet::with_capacity(ordered.len());
        for id in ordered {
            if !expected.contains(id) || !seen.insert(id) {
                return false;
            }
        }

        let mut pinned = Vec::new();
        let mut archived = Vec::new();
        let mut reorderable = IndexMap::with_capacity(ordered.len());
        for (id, note) in self.notes.drain(..) {
            match Group::of(&note) {
                Group::Pinned => pinned.push((id, note)),
                Group::Archived => archived.push((id, note)),
                Group::Unpinned => {
                    reorderable.insert(id, note);
                }
            }
        }

        let mut rebuilt = IndexMap::with_capacity(pinned.len() + ordered.len() + archived.len());
        rebuilt.extend(pinned);
        for id in ordered {
            if let Some(note) = reorderable.shift_remove(id) {
                rebuilt.insert(id.clone(), note);
            }
        }
        rebuilt.extend(archived);
        self.notes = rebuilt;
        true
    }

    fn drop_dangling_refs(&mut self) {
        if let Some(id) = &self.editing {
            if !self.notes.contains_key(id) {
                self.editing = None;
            }
        }
        if let Some(id) = &self.viewing {
            if !self.notes.contains_key(id) {
                self.viewing = None;
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn note(id: i64, title: &str, body: &str, pinned: bool, archived: bool) -> Note {
    Note {
        id: NoteId::from(id),
        title: title.into(),
        body: body.into(),
        color: None,
        image: None,
        pinned,
        archived,
    }
}
