// ── Reactive data store ──
//
// REST responses and push messages merge into the same collections.
// Every mutation publishes a fresh snapshot through a `watch` channel.

mod bounded;
mod collection;
mod data_store;
mod refresh;

pub use data_store::DataStore;
