use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::{DataObjectId, TaskId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReferenceKind {
    /// The data is materialized and directly usable.
    Concrete,
    /// A promise: the producing task has not materialized the data yet.
    Future,
}

/// A reference to a data object, as held by the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceDescriptor {
    pub id: DataObjectId,
    pub kind: ReferenceKind,
    pub producing_task: Option<TaskId>,
}

impl ReferenceDescriptor {
    pub fn future(id: DataObjectId, producing_task: TaskId) -> Self {
        Self {
            id,
            kind: ReferenceKind::Future,
            producing_task: Some(producing_task),
        }
    }

    pub fn concrete(id: DataObjectId) -> Self {
        Self {
            id,
            kind: ReferenceKind::Concrete,
            producing_task: None,
        }
    }

    pub fn consumable(&self) -> bool {
        self.kind == ReferenceKind::Concrete
    }
}

/// The reference registry: maps data-object ids to reference descriptors.
/// Externally synchronized; the scheduler treats it as a thread-safe source.
pub trait ObjectStore: Send + Sync {
    fn get_reference(&self, id: DataObjectId) -> Option<ReferenceDescriptor>;

    fn put_reference(&self, reference: ReferenceDescriptor);

    /// Flip a reference to concrete once its data has materialized.
    /// No-op for unknown ids.
    fn mark_concrete(&self, id: DataObjectId);
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    references: Mutex<HashMap<DataObjectId, ReferenceDescriptor>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get_reference(&self, id: DataObjectId) -> Option<ReferenceDescriptor> {
        self.references.lock().unwrap().get(&id).cloned()
    }

    fn put_reference(&self, reference: ReferenceDescriptor) {
        self.references
            .lock()
            .unwrap()
            .insert(reference.id, reference);
    }

    fn mark_concrete(&self, id: DataObjectId) {
        if let Some(r) = self.references.lock().unwrap().get_mut(&id) {
            r.kind = ReferenceKind::Concrete;
        }
    }
}
