use std::rc::Rc;

use flux_dispatch::{AnyPayload, ChangeSignal, DispatcherPayloadMeta, StateCell, Store};

use crate::payload::TodoPayload;

#[derive(Clone, Debug, PartialEq)]
pub struct Todo {
    pub id: usize,
    pub title: String,
    pub done: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TodoList {
    pub items: Vec<Todo>,
    next_id: usize,
}

impl TodoList {
    fn push(&mut self, title: String) {
        self.next_id += 1;
        self.items.push(Todo {
            id: self.next_id,
            title,
            done: false,
        });
    }

    pub fn contains(&self, id: usize) -> bool {
        self.items.iter().any(|todo| todo.id == id)
    }
}

#[derive(Default)]
pub struct TodoStore {
    state: StateCell<TodoList>,
}

impl Store<TodoPayload> for TodoStore {
    type State = TodoList;

    fn get_state(&self) -> Rc<TodoList> {
        self.state.get()
    }

    fn receive_payload(&self, payload: &AnyPayload<TodoPayload>, _meta: &DispatcherPayloadMeta) {
        match payload.as_user() {
            Some(TodoPayload::Added { title }) => {
                self.state.update(|list| list.push(title.clone()));
            }
            Some(TodoPayload::Toggled(id)) => self.state.update(|list| {
                if let Some(todo) = list.items.iter_mut().find(|todo| todo.id == *id) {
                    todo.done = !todo.done;
                }
            }),
            Some(TodoPayload::ClearedDone) => {
                self.state.update(|list| list.items.retain(|todo| !todo.done));
            }
            Some(TodoPayload::Imported(titles)) => self.state.update(|list| {
                for title in titles {
                    list.push(title.clone());
                }
            }),
            _ => {}
        }
    }

    fn change_signal(&self) -> &ChangeSignal {
        self.state.signal()
    }
}

/// Counters derived from the payload stream.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub added: usize,
    pub cleared_batches: usize,
    pub importing: bool,
    pub failures: usize,
}

#[derive(Default)]
pub struct StatsStore {
    state: StateCell<Stats>,
}

impl Store<TodoPayload> for StatsStore {
    type State = Stats;

    fn get_state(&self) -> Rc<Stats> {
        self.state.get()
    }

    fn receive_payload(&self, payload: &AnyPayload<TodoPayload>, _meta: &DispatcherPayloadMeta) {
        match payload {
            AnyPayload::User(TodoPayload::Added { .. }) => self.state.update(|s| s.added += 1),
            AnyPayload::User(TodoPayload::Imported(titles)) => self.state.update(|s| {
                s.added += titles.len();
                s.importing = false;
            }),
            AnyPayload::User(TodoPayload::ImportStarted) => {
                self.state.update(|s| s.importing = true)
            }
            AnyPayload::User(TodoPayload::ClearedDone) => {
                self.state.update(|s| s.cleared_batches += 1)
            }
            AnyPayload::Error(_) => self.state.update(|s| {
                s.failures += 1;
                s.importing = false;
            }),
            _ => {}
        }
    }

    fn change_signal(&self) -> &ChangeSignal {
        self.state.signal()
    }
}
