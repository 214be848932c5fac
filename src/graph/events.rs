//! Mutation notifications.
//!
//! Listeners run synchronously inside the mutating call, after the indices
//! have been updated. They receive a shared borrow of the graph, so they can
//! query it but never mutate it.

use std::ops::ControlFlow;

use super::store::Graph;
use super::types::Entity;

/// One item entering or leaving a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    Added(Entity),
    Removed(Entity),
}

impl GraphEvent {
    pub fn entity(&self) -> &Entity {
        match self {
            GraphEvent::Added(e) | GraphEvent::Removed(e) => e,
        }
    }
}

/// Handle returned by subscription; pass it to `Graph::unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Returning `Break` drops the listener.
pub(crate) type Callback = Box<dyn FnMut(&Graph, &GraphEvent) -> ControlFlow<()>>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Callback)>,
}

impl Listeners {
    pub(crate) fn insert(&mut self, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn take(&mut self) -> Vec<(ListenerId, Callback)> {
        std::mem::take(&mut self.entries)
    }

    /// Put dispatched listeners back in front of any registered meanwhile.
    pub(crate) fn restore(&mut self, mut entries: Vec<(ListenerId, Callback)>) {
        entries.append(&mut self.entries);
        self.entries = entries;
    }
}

impl Graph {
    /// Call `listener` for every node or edge added to this graph.
    pub fn on_item_added<F>(&mut self, mut listener: F) -> ListenerId
    where
        F: FnMut(&Graph, &Entity) + 'static,
    {
        self.subscribe(Box::new(move |graph, event| {
            if let GraphEvent::Added(entity) = event {
                listener(graph, entity);
            }
            ControlFlow::Continue(())
        }))
    }

    /// Call `listener` for every node or edge removed from this graph.
    pub fn on_item_removed<F>(&mut self, mut listener: F) -> ListenerId
    where
        F: FnMut(&Graph, &Entity) + 'static,
    {
        self.subscribe(Box::new(move |graph, event| {
            if let GraphEvent::Removed(entity) = event {
                listener(graph, entity);
            }
            ControlFlow::Continue(())
        }))
    }

    /// Returns false if the listener was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners_mut().remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    pub(crate) fn subscribe(&mut self, callback: Callback) -> ListenerId {
        self.listeners_mut().insert(callback)
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        let mut entries = self.listeners_mut().take();
        if entries.is_empty() {
            return;
        }
        let graph: &Graph = self;
        entries.retain_mut(|(_, callback)| callback(graph, &event).is_continue());
        self.listeners_mut().restore(entries);
    }
}
