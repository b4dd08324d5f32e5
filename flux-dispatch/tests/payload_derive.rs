//! Tests for #[derive(Payload)]

use std::marker::PhantomData;

use flux_dispatch::{AnyPayload, Payload};

#[derive(Payload, Clone, Debug, PartialEq)]
#[payload(predicates)]
enum TodoPayload {
    Added { title: String },
    Removed(usize),
    #[payload(kind = "TodoListCleared")]
    Cleared,
    ImportFinished,
}

#[test]
fn test_enum_kinds() {
    assert_eq!(
        TodoPayload::Added {
            title: "milk".into()
        }
        .kind(),
        "Added"
    );
    assert_eq!(TodoPayload::Removed(1).kind(), "Removed");
    assert_eq!(TodoPayload::Cleared.kind(), "TodoListCleared");
    assert_eq!(TodoPayload::ImportFinished.kind(), "ImportFinished");
}

#[test]
fn test_predicates() {
    assert!(TodoPayload::Removed(0).is_removed());
    assert!(!TodoPayload::Removed(0).is_cleared());
    assert!(TodoPayload::Cleared.is_cleared());
    assert!(TodoPayload::ImportFinished.is_import_finished());
    assert!(TodoPayload::Added {
        title: String::new()
    }
    .is_added());
}

#[test]
fn test_summary_defaults_to_debug() {
    assert_eq!(TodoPayload::Removed(2).summary(), "Removed(2)");
}

#[test]
fn test_any_payload_passes_kind_through() {
    let wrapped: AnyPayload<TodoPayload> = TodoPayload::Cleared.into();
    assert_eq!(wrapped.kind(), "TodoListCleared");
    assert!(!wrapped.is_trusted());
}

#[derive(Payload, Clone, Debug)]
struct Ping;

#[derive(Payload, Clone, Debug)]
#[payload(kind = "Refreshed")]
struct RefreshPayload {
    _at: u64,
}

#[test]
fn test_struct_kinds() {
    assert_eq!(Ping.kind(), "Ping");
    assert_eq!(RefreshPayload { _at: 0 }.kind(), "Refreshed");
}

#[derive(Payload, Clone, Debug)]
enum Generic<T: Clone + std::fmt::Debug + 'static> {
    Loaded(T),
    Unloaded(PhantomData<T>),
}

#[test]
fn test_generic_enum() {
    assert_eq!(Generic::Loaded(3u8).kind(), "Loaded");
    assert_eq!(Generic::<String>::Unloaded(PhantomData).kind(), "Unloaded");
}
