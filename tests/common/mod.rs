//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use sagaflow::channel::Emitter;
use sagaflow::effect::Resume;
use sagaflow::error::SagaError;
use sagaflow::interpreter::{EffectId, Runtime};
use sagaflow::middleware::{SagaMiddleware, Store};
use sagaflow::monitor::SagaMonitor;
use sagaflow::options::SagaOptions;
use sagaflow::value::{Action, Value};

/// Installs a test-writer subscriber so interpreter logs show up in failing
/// tests. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A runtime fed by an emitter, recording every dispatched action.
pub struct Harness {
    pub emitter: Emitter,
    pub runtime: Runtime,
    pub dispatched: Rc<RefCell<Vec<Action>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(SagaOptions::default())
    }

    pub fn with_options(options: SagaOptions) -> Self {
        init_tracing();
        let emitter = Emitter::new();
        let dispatched: Rc<RefCell<Vec<Action>>> = Rc::default();
        let sink = Rc::clone(&dispatched);
        let bus = emitter.clone();
        let runtime = Runtime::builder()
            .source(Rc::new(emitter.clone()))
            .dispatch(move |action: Action| {
                sink.borrow_mut().push(action.clone());
                bus.emit(&action);
                Ok(Value::Undefined)
            })
            .options(options)
            .build();
        Self {
            emitter,
            runtime,
            dispatched,
        }
    }

    pub fn dispatched_types(&self) -> Vec<String> {
        self.dispatched
            .borrow()
            .iter()
            .map(|action| action.action_type().to_string())
            .collect()
    }
}

/// A counter store wired to a saga bridge.
///
/// `INCREMENT` adds one to the state. Every reduced action is logged with the
/// dispatch nesting depth it was reduced at.
pub struct CounterStore {
    pub middleware: SagaMiddleware,
    pub count: Cell<i64>,
    pub log: RefCell<Vec<(String, usize)>>,
    depth: Cell<usize>,
}

impl CounterStore {
    pub fn new(options: SagaOptions) -> Rc<Self> {
        init_tracing();
        let store = Rc::new(Self {
            middleware: SagaMiddleware::new(options),
            count: Cell::new(0),
            log: RefCell::default(),
            depth: Cell::new(0),
        });
        store.middleware.attach(&store);
        store
    }

    pub fn types(&self) -> Vec<String> {
        self.log.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    fn reduce(&self, action: &Action) {
        if action.action_type() == "INCREMENT" {
            self.count.set(self.count.get() + 1);
        }
        self.log
            .borrow_mut()
            .push((action.action_type().to_string(), self.depth.get()));
    }
}

impl Store for CounterStore {
    fn dispatch(&self, action: Action) -> Result<Value, SagaError> {
        self.depth.set(self.depth.get() + 1);
        let result = self.middleware.process(action, |action| {
            self.reduce(&action);
            Ok(Value::Undefined)
        });
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn state(&self) -> Value {
        Value::from(self.count.get())
    }
}

/// One monitor notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Root(EffectId, String),
    Triggered {
        id: EffectId,
        parent: EffectId,
        label: String,
        kind: &'static str,
    },
    Resolved(EffectId),
    Rejected(EffectId, SagaError),
    Cancelled(EffectId),
    Dispatched(String),
}

/// A monitor recording every notification.
#[derive(Default)]
pub struct RecordingMonitor {
    pub events: RefCell<Vec<Event>>,
}

impl RecordingMonitor {
    pub fn triggered_kinds(&self) -> Vec<&'static str> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Triggered { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|event| predicate(event)).count()
    }
}

impl SagaMonitor for RecordingMonitor {
    fn root_saga_started(&self, effect_id: EffectId, name: &str) {
        self.events
            .borrow_mut()
            .push(Event::Root(effect_id, name.to_string()));
    }

    fn effect_triggered(
        &self,
        effect_id: EffectId,
        parent_effect_id: EffectId,
        label: &str,
        effect: &sagaflow::effect::Effect,
    ) {
        self.events.borrow_mut().push(Event::Triggered {
            id: effect_id,
            parent: parent_effect_id,
            label: label.to_string(),
            kind: effect.kind(),
        });
    }

    fn effect_resolved(&self, effect_id: EffectId, _result: &Resume) {
        self.events.borrow_mut().push(Event::Resolved(effect_id));
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        self.events
            .borrow_mut()
            .push(Event::Rejected(effect_id, error.clone()));
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        self.events.borrow_mut().push(Event::Cancelled(effect_id));
    }

    fn action_dispatched(&self, action: &Action) {
        self.events
            .borrow_mut()
            .push(Event::Dispatched(action.action_type().to_string()));
    }
}
