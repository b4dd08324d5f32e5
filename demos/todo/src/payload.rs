use flux_dispatch::Payload;

#[derive(Payload, Clone, Debug, PartialEq)]
pub enum TodoPayload {
    Added { title: String },
    Toggled(usize),
    ClearedDone,
    ImportStarted,
    Imported(Vec<String>),
}
