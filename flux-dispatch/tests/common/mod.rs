#![allow(dead_code)]

use std::rc::Rc;

use flux_dispatch::prelude::*;
use flux_dispatch::testing::{ChangeRecorder, PayloadRecorder};

#[derive(Payload, Clone, Debug, PartialEq)]
pub enum AppPayload {
    SetA(i32),
    SetB(String),
    SetC(i32),
    SetD(i32),
    Noop,
}

type Extract<T> = fn(&AppPayload) -> Option<T>;

/// A store holding one value, updated by one payload variant.
pub struct ValueStore<T> {
    name: &'static str,
    state: StateCell<T>,
    extract: Extract<T>,
}

impl<T> ValueStore<T> {
    pub fn new(name: &'static str, initial: T, extract: Extract<T>) -> Rc<Self> {
        Rc::new(Self {
            name,
            state: StateCell::new(initial),
            extract,
        })
    }

    /// Mutate the store directly, bypassing dispatch.
    pub fn set(&self, value: T) {
        self.state.set(value);
    }
}

impl<T: 'static> Store<AppPayload> for ValueStore<T> {
    type State = T;

    fn name(&self) -> &str {
        self.name
    }

    fn get_state(&self) -> Rc<T> {
        self.state.get()
    }

    fn receive_payload(&self, payload: &AnyPayload<AppPayload>, _meta: &DispatcherPayloadMeta) {
        if let Some(value) = payload.as_user().and_then(self.extract) {
            self.state.set(value);
        }
    }

    fn change_signal(&self) -> &ChangeSignal {
        self.state.signal()
    }
}

pub struct Fixture {
    pub a: Rc<ValueStore<i32>>,
    pub b: Rc<ValueStore<String>>,
    pub c: Rc<ValueStore<i32>>,
    pub d: Rc<ValueStore<i32>>,
    pub context: Context<AppPayload>,
    pub changes: ChangeRecorder,
    pub payloads: PayloadRecorder<AppPayload>,
}

pub fn fixture() -> Fixture {
    fixture_with(ContextConfig::default())
}

pub fn fixture_with(config: ContextConfig) -> Fixture {
    let a = ValueStore::new("AStore", 0, |p| match p {
        AppPayload::SetA(v) => Some(*v),
        _ => None,
    });
    let b = ValueStore::new("BStore", "x".to_string(), |p| match p {
        AppPayload::SetB(v) => Some(v.clone()),
        _ => None,
    });
    let c = ValueStore::new("CStore", 0, |p| match p {
        AppPayload::SetC(v) => Some(*v),
        _ => None,
    });
    let d = ValueStore::new("DStore", 0, |p| match p {
        AppPayload::SetD(v) => Some(*v),
        _ => None,
    });

    let group = StoreGroup::<AppPayload>::builder()
        .store(a.clone())
        .store(b.clone())
        .store(c.clone())
        .store(d.clone())
        .build()
        .expect("distinct state keys");

    let context = Context::builder(Dispatcher::new(), group)
        .config(config)
        .build();
    let changes = ChangeRecorder::attach(context.store_group());
    let payloads = PayloadRecorder::attach(context.dispatcher());

    Fixture {
        a,
        b,
        c,
        d,
        context,
        changes,
        payloads,
    }
}

/// A use case dispatching every payload it is given, synchronously.
pub fn dispatch_all(name: &'static str) -> UseCaseKind<AppPayload, Vec<AppPayload>> {
    UseCaseKind::functional(
        name,
        |ctx: &UseCaseContext<AppPayload>, payloads: Vec<AppPayload>| {
            for payload in payloads {
                ctx.dispatch(payload);
            }
            Execution::done()
        },
    )
}

pub fn names(flush: &[&str]) -> Vec<String> {
    flush.iter().map(|name| name.to_string()).collect()
}
