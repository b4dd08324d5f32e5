//! Todo list - flux-dispatch demo
//!
//! Drives two stores through use cases and prints one line per change
//! notification:
//! 1. Use case dispatches payloads
//! 2. Stores update their snapshots
//! 3. StoreGroup batches the changes until the use case boundary
//! 4. `on_change` re-reads the merged state
//!
//! # Usage
//!
//! ```sh
//! cargo run -p todo -- milk eggs --import bread,butter
//!
//! # Strict mode and timing
//! cargo run -p todo -- milk --strict --profile
//!
//! # Dump the payload log as JSON
//! cargo run -p todo -- milk --log-json --log-exclude "Did*"
//! ```

mod payload;
mod stores;
mod use_cases;

use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use flux_dispatch::prelude::*;
use flux_dispatch::{PayloadLogConfig, PayloadLogger, PayloadLoggerConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::payload::TodoPayload;
use crate::stores::{Stats, StatsStore, TodoList, TodoStore};
use crate::use_cases::{clear_done, AddTodo, ImportTodos, ToggleTodo};

/// Todo list - flux-dispatch demo
#[derive(Parser, Debug)]
#[command(name = "todo")]
#[command(about = "A todo list demonstrating flux-dispatch use cases and stores")]
struct Args {
    /// Titles to add, one use case each
    titles: Vec<String>,

    /// Comma-separated titles to import asynchronously
    #[arg(long, value_delimiter = ',')]
    import: Vec<String>,

    /// Simulated import latency in milliseconds
    #[arg(long, default_value = "50")]
    import_delay_ms: u64,

    /// Toggle this todo id after adding
    #[arg(long, default_value = "1")]
    toggle: usize,

    /// Panic when a store changes outside a use case
    #[arg(long)]
    strict: bool,

    /// Attach elapsed time to lifecycle payloads
    #[arg(long)]
    profile: bool,

    /// Only log payload kinds matching these globs (comma-separated)
    #[arg(long)]
    log_include: Option<String>,

    /// Skip payload kinds matching these globs (comma-separated)
    #[arg(long)]
    log_exclude: Option<String>,

    /// Print the payload log as JSON on exit
    #[arg(long)]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), FluxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let todos = Rc::new(TodoStore::default());
    let stats = Rc::new(StatsStore::default());
    let group = StoreGroup::<TodoPayload>::builder()
        .store(todos.clone())
        .store(stats)
        .build()?;

    let context = Context::builder(Dispatcher::new(), group)
        .config(
            ContextConfig::new()
                .strict(args.strict)
                .performance_profile(args.profile),
        )
        .build();

    let logger = PayloadLogger::with_log(PayloadLogConfig::new(
        500,
        PayloadLoggerConfig::new(args.log_include.as_deref(), args.log_exclude.as_deref()),
    ));
    let _logging = logger.observe(context.dispatcher());

    let _errors = context.on_error_dispatch(|payload, meta| {
        let use_case = meta.use_case.as_ref().map(|u| u.name.to_string());
        warn!(use_case = ?use_case, error = %payload.error, "use case reported an error");
    });

    let group = context.store_group().clone();
    let _render = context.on_change(move || render(&group.get_state()));

    for title in args.titles {
        if let Err(error) = context.use_case(Rc::new(AddTodo)).execute(title).await {
            error!(%error, "add failed");
        }
    }

    let toggle = Rc::new(ToggleTodo {
        todos: todos.clone(),
    });
    if let Err(error) = context.use_case(toggle).execute(args.toggle).await {
        error!(%error, "toggle failed");
    }

    if !args.import.is_empty() {
        let import = Rc::new(ImportTodos {
            delay: Duration::from_millis(args.import_delay_ms),
        });
        match context.use_case(import).execute(args.import).await {
            Ok(()) => info!("import finished"),
            Err(error) => error!(%error, "import failed"),
        }
    }

    if let Err(error) = context.use_case(clear_done()).execute(()).await {
        error!(%error, "clear failed");
    }

    if args.log_json {
        match logger.to_json() {
            Some(Ok(json)) => println!("{json}"),
            Some(Err(error)) => error!(%error, "payload log serialization failed"),
            None => {}
        }
    }

    context.release();
    Ok(())
}

fn render(state: &MergedState) {
    let (Some(list), Some(stats)) = (state.get::<TodoList>("todo"), state.get::<Stats>("stats"))
    else {
        return;
    };

    let items: Vec<String> = list
        .items
        .iter()
        .map(|todo| format!("[{}] {}#{}", if todo.done { "x" } else { " " }, todo.title, todo.id))
        .collect();
    println!(
        "{} todo(s){} | added {} | cleared {} | failures {} | {}",
        list.items.len(),
        if stats.importing { " (importing)" } else { "" },
        stats.added,
        stats.cleared_batches,
        stats.failures,
        items.join(", ")
    );
}
