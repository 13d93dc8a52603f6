//! Element store with optimistic writes.
//!
//! Every mutation is applied locally first and returns a [`PendingWrite`]
//! describing the request to send to the backend. The store keeps what it
//! needs to undo the mutation until [`ElementStore::complete`] reports the
//! backend's verdict.

use crate::element::{CanvasId, Element, ElementId, Properties, PropertiesPatch};
use crate::sync::ChangeEvent;
use std::collections::HashMap;
use thiserror::Error;

/// Client-scoped correlation id for a write.
pub type WriteId = u64;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Element not found: {0}")]
    NotFound(ElementId),
    #[error("Cannot change element kind from {from} to {to}")]
    KindMismatch { from: &'static str, to: &'static str },
    #[error("Element belongs to canvas {found}, expected {expected}")]
    WrongCanvas { expected: CanvasId, found: CanvasId },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A request the backend must confirm or reject.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Insert(Element),
    InsertBatch(Vec<Element>),
    /// Carries the element's entire properties, not a field delta.
    Update { id: ElementId, properties: Properties },
    Delete { id: ElementId },
}

/// A locally applied mutation awaiting remote confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub write_id: WriteId,
    pub request: WriteRequest,
}

/// What [`ElementStore::complete`] did with a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The backend accepted the write.
    Confirmed,
    /// The backend rejected the write and the local change was undone.
    RolledBack { reason: String },
    /// No rollback record matched the write id.
    Unknown,
}

/// How to undo a pending write.
#[derive(Debug, Clone)]
enum Rollback {
    /// Remove optimistically inserted elements.
    Remove(Vec<ElementId>),
    /// Put back the properties an element had before the write.
    Restore { id: ElementId, previous: Properties },
    /// Put a deleted element back where it was.
    Reinsert { index: usize, element: Element },
}

/// Ordered elements of one canvas (back to front).
#[derive(Debug, Clone)]
pub struct ElementStore {
    canvas_id: CanvasId,
    elements: Vec<Element>,
    pending: HashMap<WriteId, Rollback>,
    next_write_id: WriteId,
}

impl ElementStore {
    /// Create an empty store for a canvas.
    pub fn new(canvas_id: impl Into<CanvasId>) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            elements: Vec::new(),
            pending: HashMap::new(),
            next_write_id: 1,
        }
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    /// Elements in render order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn index_of(&self, id: ElementId) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    /// Number of writes still awaiting a verdict.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Replace the contents with an authoritative list (initial load).
    ///
    /// Elements for other canvases are skipped. Pending rollbacks are dropped.
    pub fn load(&mut self, elements: Vec<Element>) {
        let canvas_id = &self.canvas_id;
        let (ours, foreign): (Vec<_>, Vec<_>) =
            elements.into_iter().partition(|e| &e.canvas_id == canvas_id);
        if !foreign.is_empty() {
            log::warn!("Skipped {} elements from other canvases", foreign.len());
        }
        self.elements = ours;
        self.pending.clear();
    }

    fn begin(&mut self, rollback: Rollback, request: WriteRequest) -> PendingWrite {
        let write_id = self.next_write_id;
        self.next_write_id += 1;
        self.pending.insert(write_id, rollback);
        PendingWrite { write_id, request }
    }

    fn check_canvas(&self, element: &Element) -> StoreResult<()> {
        if element.canvas_id != self.canvas_id {
            return Err(StoreError::WrongCanvas {
                expected: self.canvas_id.clone(),
                found: element.canvas_id.clone(),
            });
        }
        Ok(())
    }

    fn get_mut(&mut self, id: ElementId) -> StoreResult<&mut Element> {
        self.elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Append an element and request its creation.
    pub fn insert(&mut self, element: Element) -> StoreResult<PendingWrite> {
        self.check_canvas(&element)?;
        self.elements.push(element.clone());
        Ok(self.begin(Rollback::Remove(vec![element.id]), WriteRequest::Insert(element)))
    }

    /// Append several elements under a single write.
    pub fn insert_batch(&mut self, elements: Vec<Element>) -> StoreResult<PendingWrite> {
        for element in &elements {
            self.check_canvas(element)?;
        }
        let ids = elements.iter().map(|e| e.id).collect();
        self.elements.extend(elements.iter().cloned());
        Ok(self.begin(Rollback::Remove(ids), WriteRequest::InsertBatch(elements)))
    }

    /// Merge a partial update and request a write of the full properties.
    pub fn update(&mut self, id: ElementId, patch: &PropertiesPatch) -> StoreResult<PendingWrite> {
        let element = self.get_mut(id)?;
        let previous = element.properties.clone();
        element.properties.apply_patch(patch);
        let properties = element.properties.clone();
        Ok(self.begin(
            Rollback::Restore { id, previous },
            WriteRequest::Update { id, properties },
        ))
    }

    /// Replace an element's properties and request a write. The kind must not change.
    pub fn replace_properties(&mut self, id: ElementId, properties: Properties) -> StoreResult<PendingWrite> {
        let element = self.get_mut(id)?;
        let previous = element.properties.clone();
        ensure_same_kind(&previous, &properties)?;
        element.properties = properties.clone();
        Ok(self.begin(
            Rollback::Restore { id, previous },
            WriteRequest::Update { id, properties },
        ))
    }

    /// Request a write of the element's current properties, rolling back to
    /// `previous` on failure.
    ///
    /// Used after a gesture whose intermediate frames were applied locally.
    pub fn commit(&mut self, id: ElementId, previous: Properties) -> StoreResult<PendingWrite> {
        let element = self.get_mut(id)?;
        ensure_same_kind(&previous, &element.properties)?;
        let properties = element.properties.clone();
        Ok(self.begin(
            Rollback::Restore { id, previous },
            WriteRequest::Update { id, properties },
        ))
    }

    /// Merge a partial update locally without requesting a write.
    pub fn update_local(&mut self, id: ElementId, patch: &PropertiesPatch) -> StoreResult<()> {
        self.get_mut(id)?.properties.apply_patch(patch);
        Ok(())
    }

    /// Replace properties locally without requesting a write. The kind must not change.
    pub fn replace_local(&mut self, id: ElementId, properties: Properties) -> StoreResult<()> {
        let element = self.get_mut(id)?;
        ensure_same_kind(&element.properties, &properties)?;
        element.properties = properties;
        Ok(())
    }

    /// Remove an element and request its deletion.
    pub fn delete(&mut self, id: ElementId) -> StoreResult<PendingWrite> {
        let index = self.index_of(id).ok_or(StoreError::NotFound(id))?;
        let element = self.elements.remove(index);
        Ok(self.begin(Rollback::Reinsert { index, element }, WriteRequest::Delete { id }))
    }

    /// Apply the backend's verdict on a write.
    pub fn complete(&mut self, write_id: WriteId, result: Result<(), String>) -> WriteOutcome {
        let Some(rollback) = self.pending.remove(&write_id) else {
            log::debug!("No pending write {}", write_id);
            return WriteOutcome::Unknown;
        };

        let reason = match result {
            Ok(()) => return WriteOutcome::Confirmed,
            Err(reason) => reason,
        };

        log::warn!("Write {} rejected: {}; rolling back", write_id, reason);
        match rollback {
            Rollback::Remove(ids) => {
                self.elements.retain(|e| !ids.contains(&e.id));
            }
            Rollback::Restore { id, previous } => match self.get_mut(id) {
                Ok(element) => element.properties = previous,
                Err(_) => log::warn!("Cannot roll back write {}: element {} is gone", write_id, id),
            },
            Rollback::Reinsert { index, element } => {
                if self.contains(element.id) {
                    log::debug!("Element {} already restored", element.id);
                } else {
                    let index = index.min(self.elements.len());
                    self.elements.insert(index, element);
                }
            }
        }
        WriteOutcome::RolledBack { reason }
    }

    /// Roll back every write still awaiting a verdict, newest first.
    ///
    /// Used when the connection is lost and no acks will arrive. Returns the
    /// ids of the writes undone.
    pub fn fail_pending(&mut self, reason: &str) -> Vec<WriteId> {
        let mut ids: Vec<WriteId> = self.pending.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        for &id in &ids {
            self.complete(id, Err(reason.to_string()));
        }
        ids
    }

    /// Reconcile a remote change. Returns true if local state changed.
    ///
    /// Inserts of an id that already exists are ignored, which suppresses the
    /// echo of our own optimistic inserts. Updates replace the whole element.
    pub fn apply_change(&mut self, change: &ChangeEvent) -> bool {
        if change.canvas_id() != self.canvas_id {
            log::debug!("Ignoring change for canvas {}", change.canvas_id());
            return false;
        }

        match change {
            ChangeEvent::Insert { element } => {
                if self.contains(element.id) {
                    return false;
                }
                self.elements.push(element.clone());
                true
            }
            ChangeEvent::Update { element } => match self.get_mut(element.id) {
                Ok(existing) if *existing == *element => false,
                Ok(existing) => {
                    if let Err(e) = ensure_same_kind(&existing.properties, &element.properties) {
                        log::warn!("Dropping remote update of {}: {}", element.id, e);
                        return false;
                    }
                    *existing = element.clone();
                    true
                }
                Err(_) => {
                    log::debug!("Ignoring update for unknown element {}", element.id);
                    false
                }
            },
            ChangeEvent::Delete { id, .. } => {
                let before = self.elements.len();
                self.elements.retain(|e| e.id != *id);
                self.elements.len() != before
            }
        }
    }
}

fn ensure_same_kind(current: &Properties, next: &Properties) -> StoreResult<()> {
    if current.kind() != next.kind() {
        return Err(StoreError::KindMismatch {
            from: current.kind().name(),
            to: next.kind().name(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ElementStore {
        ElementStore::new("canvas")
    }

    fn rect(x: f64) -> Element {
        Element::new("canvas", Properties::rect(x, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_insert_is_local_first() {
        let mut store = store();
        let el = rect(0.0);
        let write = store.insert(el.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(write.request, WriteRequest::Insert(el));
        assert_eq!(store.pending_writes(), 1);
    }

    #[test]
    fn test_insert_rejects_foreign_canvas() {
        let mut store = store();
        let el = Element::new("other", Properties::rect(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(store.insert(el), Err(StoreError::WrongCanvas { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejected_insert_removes_element() {
        let mut store = store();
        let write = store.insert(rect(0.0)).unwrap();
        let outcome = store.complete(write.write_id, Err("boom".into()));
        assert_eq!(outcome, WriteOutcome::RolledBack { reason: "boom".into() });
        assert!(store.is_empty());
    }

    #[test]
    fn test_confirmed_write_drops_rollback() {
        let mut store = store();
        let write = store.insert(rect(0.0)).unwrap();
        assert_eq!(store.complete(write.write_id, Ok(())), WriteOutcome::Confirmed);
        assert_eq!(store.pending_writes(), 0);
        assert_eq!(store.complete(write.write_id, Err("late".into())), WriteOutcome::Unknown);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_echoed_insert_is_deduplicated() {
        let mut store = store();
        let el = rect(0.0);
        store.insert(el.clone()).unwrap();
        let changed = store.apply_change(&ChangeEvent::Insert { element: el });
        assert!(!changed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_sends_whole_properties() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.insert(el).unwrap();
        let write = store.update(id, &PropertiesPatch::position(5.0, 6.0)).unwrap();
        assert_eq!(
            write.request,
            WriteRequest::Update { id, properties: Properties::rect(5.0, 6.0, 10.0, 10.0) }
        );
    }

    #[test]
    fn test_rejected_update_restores_previous() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.insert(el).unwrap();
        let write = store.update(id, &PropertiesPatch::position(5.0, 6.0)).unwrap();
        store.complete(write.write_id, Err("nope".into()));
        assert_eq!(store.get(id).unwrap().properties, Properties::rect(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_rejected_update_of_vanished_element_is_logged_only() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.insert(el).unwrap();
        let write = store.update(id, &PropertiesPatch::position(5.0, 6.0)).unwrap();
        store.apply_change(&ChangeEvent::Delete { canvas_id: "canvas".into(), id });
        let outcome = store.complete(write.write_id, Err("nope".into()));
        assert!(matches!(outcome, WriteOutcome::RolledBack { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remote_update_cannot_change_kind() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.load(vec![el.clone()]);
        let mut retyped = el.clone();
        retyped.properties = Properties::text(0.0, 0.0, "x");
        assert!(!store.apply_change(&ChangeEvent::Update { element: retyped }));
        assert_eq!(store.get(id).unwrap().properties, el.properties);
    }

    #[test]
    fn test_fail_pending_undoes_newest_first() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.load(vec![el]);
        let added = rect(50.0);
        let added_id = added.id;
        store.insert(added).unwrap();
        store.update(id, &PropertiesPatch::position(5.0, 0.0)).unwrap();
        store.update(id, &PropertiesPatch::position(9.0, 0.0)).unwrap();

        let undone = store.fail_pending("connection lost");
        assert_eq!(undone.len(), 3);
        assert_eq!(store.pending_writes(), 0);
        assert!(!store.contains(added_id));
        assert_eq!(store.get(id).unwrap().properties, Properties::rect(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_kind_is_immutable() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.insert(el).unwrap();
        let result = store.replace_properties(id, Properties::arrow(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(result, Err(StoreError::KindMismatch { from: "rect", to: "arrow" })));
        assert!(store.replace_local(id, Properties::text(0.0, 0.0, "x")).is_err());
    }

    #[test]
    fn test_commit_rolls_back_to_given_snapshot() {
        let mut store = store();
        let el = rect(0.0);
        let id = el.id;
        store.insert(el).unwrap();
        let original = store.get(id).unwrap().properties.clone();
        store.replace_local(id, Properties::rect(30.0, 0.0, 10.0, 10.0)).unwrap();
        store.replace_local(id, Properties::rect(40.0, 0.0, 10.0, 10.0)).unwrap();
        let write = store.commit(id, original.clone()).unwrap();
        assert_eq!(
            write.request,
            WriteRequest::Update { id, properties: Properties::rect(40.0, 0.0, 10.0, 10.0) }
        );
        store.complete(write.write_id, Err("offline".into()));
        assert_eq!(store.get(id).unwrap().properties, original);
    }

    #[test]
    fn test_failed_delete_restores_original_position() {
        let mut store = store();
        let (a, b, c) = (rect(0.0), rect(1.0), rect(2.0));
        let ids = [a.id, b.id, c.id];
        for el in [a, b, c] {
            store.insert(el).unwrap();
        }
        let write = store.delete(ids[1]).unwrap();
        assert_eq!(store.len(), 2);
        store.complete(write.write_id, Err("denied".into()));
        let order: Vec<_> = store.elements().iter().map(|e| e.id).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_delete_missing_element() {
        let mut store = store();
        let id = rect(0.0).id;
        assert_eq!(store.delete(id), Err(StoreError::NotFound(id)));
    }

    #[test]
    fn test_batch_insert_rolls_back_all() {
        let mut store = store();
        store.insert(rect(9.0)).unwrap();
        let write = store.insert_batch(vec![rect(0.0), rect(1.0)]).unwrap();
        assert_eq!(store.len(), 3);
        store.complete(write.write_id, Err("bad".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remote_update_replaces_whole_element() {
        let mut store = store();
        let el = rect(0.0);
        store.insert(el.clone()).unwrap();
        let mut remote = el.clone();
        remote.properties = Properties::rect(7.0, 7.0, 1.0, 1.0);
        assert!(store.apply_change(&ChangeEvent::Update { element: remote.clone() }));
        assert_eq!(store.get(el.id), Some(&remote));
    }

    #[test]
    fn test_remote_update_for_unknown_is_ignored() {
        let mut store = store();
        assert!(!store.apply_change(&ChangeEvent::Update { element: rect(0.0) }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remote_change_for_other_canvas_is_ignored() {
        let mut store = store();
        let foreign = Element::new("elsewhere", Properties::rect(0.0, 0.0, 1.0, 1.0));
        assert!(!store.apply_change(&ChangeEvent::Insert { element: foreign }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remote_delete() {
        let mut store = store();
        let el = rect(0.0);
        store.insert(el.clone()).unwrap();
        assert!(store.apply_change(&ChangeEvent::Delete { canvas_id: "canvas".into(), id: el.id }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_filters_foreign_elements() {
        let mut store = store();
        store.load(vec![rect(0.0), Element::new("x", Properties::rect(0.0, 0.0, 1.0, 1.0))]);
        assert_eq!(store.len(), 1);
    }
}
