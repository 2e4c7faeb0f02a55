mod actor;

pub use actor::{keys, StoreActor, StoreCommand, StoreHandle};
