//! Reactive queries.
//!
//! Both wrappers subscribe to the graph's notifications and recompute when a
//! mutation touches an item that could bind one of the query's slots.
//! Listeners hold only a weak reference to the handle's state: once the
//! handle is dropped or destroyed, the graph discards the listener on its
//! next notification.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::rc::{Rc, Weak};
use std::vec;
use tracing::{debug, trace};

use super::output::QueryOutput;
use super::{CompiledQuery, Outputs, QueryInput};
use crate::error::{MotifError, Result};
use crate::graph::{EntityId, Graph, GraphEvent, GraphId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Materialize results and keep them current. `None` uses the graph's
    /// `query.cache` setting.
    pub cache: Option<bool>,
}

impl QueryOptions {
    pub fn cached() -> Self {
        Self { cache: Some(true) }
    }

    pub fn uncached() -> Self {
        Self { cache: Some(false) }
    }
}

// ─── Cached pull query ─────────────────────────────────────────────

#[derive(Default)]
struct CacheState {
    cache: Option<Vec<QueryOutput>>,
    searches: usize,
    destroyed: bool,
}

/// Handle returned by [`Graph::query`].
pub struct CachedQuery {
    graph: GraphId,
    query: Rc<CompiledQuery>,
    state: Rc<RefCell<CacheState>>,
}

/// Results of one [`CachedQuery::run`].
pub enum Results<'a> {
    Cached(vec::IntoIter<QueryOutput>),
    Live(Outputs<'a>),
}

impl Iterator for Results<'_> {
    type Item = QueryOutput;

    fn next(&mut self) -> Option<QueryOutput> {
        match self {
            Results::Cached(iter) => iter.next(),
            Results::Live(iter) => iter.next(),
        }
    }
}

impl CachedQuery {
    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }

    pub fn is_cached(&self) -> bool {
        self.state.borrow().cache.is_some()
    }

    /// Number of times the underlying search has been started.
    pub fn searches(&self) -> usize {
        self.state.borrow().searches
    }

    /// Current results. Served from the cache when caching is on; otherwise
    /// a fresh lazy search.
    pub fn run<'a>(&'a self, graph: &'a Graph) -> Result<Results<'a>> {
        if graph.id() != self.graph {
            return Err(MotifError::BrokenInvariant(
                "query handle run against a different graph".into(),
            ));
        }
        let mut state = self.state.borrow_mut();
        if state.destroyed {
            return Err(MotifError::Destroyed);
        }
        if let Some(cache) = &state.cache {
            return Ok(Results::Cached(cache.clone().into_iter()));
        }
        state.searches += 1;
        Ok(Results::Live(self.query.outputs(graph)))
    }

    /// Stop tracking the graph and drop cached results. Calling it again
    /// does nothing.
    pub fn destroy(&self) {
        let mut state = self.state.borrow_mut();
        if !state.destroyed {
            state.destroyed = true;
            state.cache = None;
            debug!("cached query destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }
}

// ─── Observer ──────────────────────────────────────────────────────

type OutputListener = Box<dyn FnMut(&QueryOutput)>;

#[derive(Default)]
struct ObserverState {
    current: Vec<QueryOutput>,
    added: Vec<QueryOutput>,
    removed: Vec<QueryOutput>,
    on_added: Vec<OutputListener>,
    on_removed: Vec<OutputListener>,
    destroyed: bool,
}

/// Handle returned by [`Graph::observe`].
pub struct Observer {
    query: Rc<CompiledQuery>,
    state: Rc<RefCell<ObserverState>>,
}

impl Observer {
    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }

    /// Outputs that appeared since the last call.
    pub fn added(&self) -> Vec<QueryOutput> {
        std::mem::take(&mut self.state.borrow_mut().added)
    }

    /// Outputs that disappeared since the last call.
    pub fn removed(&self) -> Vec<QueryOutput> {
        std::mem::take(&mut self.state.borrow_mut().removed)
    }

    /// The full result set as of the last relevant mutation.
    pub fn current(&self) -> Vec<QueryOutput> {
        self.state.borrow().current.clone()
    }

    /// Called with each newly appearing output, inside the mutating call.
    pub fn on_added<F>(&self, listener: F)
    where
        F: FnMut(&QueryOutput) + 'static,
    {
        let mut state = self.state.borrow_mut();
        if !state.destroyed {
            state.on_added.push(Box::new(listener));
        }
    }

    /// Called with each disappearing output, inside the mutating call.
    pub fn on_removed<F>(&self, listener: F)
    where
        F: FnMut(&QueryOutput) + 'static,
    {
        let mut state = self.state.borrow_mut();
        if !state.destroyed {
            state.on_removed.push(Box::new(listener));
        }
    }

    pub fn destroy(&self) {
        let mut state = self.state.borrow_mut();
        if state.destroyed {
            return;
        }
        *state = ObserverState {
            destroyed: true,
            ..ObserverState::default()
        };
        debug!("observer destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }
}

impl ObserverState {
    /// Replace the snapshot and queue the difference.
    fn refresh(&mut self, fresh: Vec<QueryOutput>) -> (Vec<QueryOutput>, Vec<QueryOutput>) {
        let before: HashSet<Vec<EntityId>> =
            self.current.iter().map(QueryOutput::identity).collect();
        let after: HashSet<Vec<EntityId>> = fresh.iter().map(QueryOutput::identity).collect();

        let appeared: Vec<QueryOutput> = fresh
            .iter()
            .filter(|output| !before.contains(&output.identity()))
            .cloned()
            .collect();
        let vanished: Vec<QueryOutput> = self
            .current
            .iter()
            .filter(|output| !after.contains(&output.identity()))
            .cloned()
            .collect();

        self.current = fresh;
        self.added.extend(appeared.iter().cloned());
        self.removed.extend(vanished.iter().cloned());
        (appeared, vanished)
    }
}

/// Run `listeners` outside the state borrow, then put them back in front of
/// any registered meanwhile.
fn dispatch(
    state: &RefCell<ObserverState>,
    outputs: &[QueryOutput],
    pick: fn(&mut ObserverState) -> &mut Vec<OutputListener>,
) {
    if outputs.is_empty() {
        return;
    }
    let mut listeners = std::mem::take(pick(&mut state.borrow_mut()));
    for listener in &mut listeners {
        for output in outputs {
            listener(output);
        }
    }
    let mut state = state.borrow_mut();
    if state.destroyed {
        return;
    }
    let slot = pick(&mut state);
    listeners.append(slot);
    *slot = listeners;
}

// ─── Graph integration ─────────────────────────────────────────────

fn relevant(query: &CompiledQuery, graph: &Graph, event: &GraphEvent) -> bool {
    query.is_relevant(event.entity(), graph.types())
}

impl Graph {
    /// A pull query. With caching on, results are computed now and again
    /// after every relevant mutation; `run` then never searches.
    pub fn query(
        &mut self,
        input: impl Into<QueryInput>,
        options: QueryOptions,
    ) -> Result<CachedQuery> {
        let query = Rc::new(CompiledQuery::compile(&input.into(), self.types())?);
        let cache = options.cache.unwrap_or(self.config().query.cache);
        let state = Rc::new(RefCell::new(CacheState::default()));

        if cache {
            {
                let mut s = state.borrow_mut();
                s.cache = Some(query.outputs(self).collect());
                s.searches += 1;
            }
            let weak: Weak<RefCell<CacheState>> = Rc::downgrade(&state);
            let tracked = Rc::clone(&query);
            self.subscribe(Box::new(move |graph, event| {
                let Some(state) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let mut state = state.borrow_mut();
                if state.destroyed {
                    return ControlFlow::Break(());
                }
                if relevant(&tracked, graph, event) {
                    let results: Vec<QueryOutput> = tracked.outputs(graph).collect();
                    trace!(results = results.len(), "cached query recomputed");
                    state.cache = Some(results);
                    state.searches += 1;
                }
                ControlFlow::Continue(())
            }));
        }
        debug!(cache, slots = query.slots().len(), "query registered");

        Ok(CachedQuery {
            graph: self.id(),
            query,
            state,
        })
    }

    /// An observer. The results at construction are the baseline; only
    /// later changes are reported as added or removed.
    pub fn observe(&mut self, input: impl Into<QueryInput>) -> Result<Observer> {
        let query = Rc::new(CompiledQuery::compile(&input.into(), self.types())?);
        let state = Rc::new(RefCell::new(ObserverState {
            current: query.outputs(self).collect(),
            ..ObserverState::default()
        }));

        let weak: Weak<RefCell<ObserverState>> = Rc::downgrade(&state);
        let tracked = Rc::clone(&query);
        self.subscribe(Box::new(move |graph, event| {
            let Some(state) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            if state.borrow().destroyed {
                return ControlFlow::Break(());
            }
            if !relevant(&tracked, graph, event) {
                return ControlFlow::Continue(());
            }
            let fresh: Vec<QueryOutput> = tracked.outputs(graph).collect();
            let (appeared, vanished) = state.borrow_mut().refresh(fresh);
            trace!(
                added = appeared.len(),
                removed = vanished.len(),
                "observer refreshed"
            );
            dispatch(&state, &appeared, |s| &mut s.on_added);
            dispatch(&state, &vanished, |s| &mut s.on_removed);
            ControlFlow::Continue(())
        }));
        debug!(
            slots = query.slots().len(),
            baseline = state.borrow().current.len(),
            "observer registered"
        );

        Ok(Observer { query, state })
    }
}
