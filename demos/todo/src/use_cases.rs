use std::rc::Rc;
use std::time::Duration;

use flux_dispatch::prelude::*;
use thiserror::Error;

use crate::payload::TodoPayload;
use crate::stores::TodoStore;

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("no todo with id {0}")]
    UnknownTodo(usize),
    #[error("import source is empty")]
    EmptyImport,
}

pub struct AddTodo;

impl UseCase<TodoPayload> for AddTodo {
    type Args = String;

    fn should_execute(&self, title: &String) -> bool {
        !title.trim().is_empty()
    }

    fn execute(&self, context: &UseCaseContext<TodoPayload>, title: String) -> Execution {
        context.dispatch(TodoPayload::Added {
            title: title.trim().to_string(),
        });
        Execution::done()
    }
}

/// Flips a todo; an unknown id is reported without failing.
pub struct ToggleTodo {
    pub todos: Rc<TodoStore>,
}

impl UseCase<TodoPayload> for ToggleTodo {
    type Args = usize;

    fn execute(&self, context: &UseCaseContext<TodoPayload>, id: usize) -> Execution {
        if self.todos.get_state().contains(id) {
            context.dispatch(TodoPayload::Toggled(id));
        } else {
            context.throw_error(TodoError::UnknownTodo(id));
        }
        Execution::done()
    }
}

pub fn clear_done() -> UseCaseKind<TodoPayload, ()> {
    UseCaseKind::functional("ClearDone", |ctx: &UseCaseContext<TodoPayload>, _: ()| {
        ctx.dispatch(TodoPayload::ClearedDone);
        Execution::done()
    })
}

/// Simulates a slow fetch, then adds every title at once.
pub struct ImportTodos {
    pub delay: Duration,
}

impl UseCase<TodoPayload> for ImportTodos {
    type Args = Vec<String>;

    fn execute(&self, context: &UseCaseContext<TodoPayload>, titles: Vec<String>) -> Execution {
        let context = context.clone();
        let delay = self.delay;
        Execution::pending(async move {
            context.dispatch(TodoPayload::ImportStarted);
            tokio::time::sleep(delay).await;

            if titles.is_empty() {
                return Err(TodoError::EmptyImport.into());
            }
            context.dispatch(TodoPayload::Imported(titles));
            Ok(())
        })
    }
}
