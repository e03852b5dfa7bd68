mod collection;
mod counter;
mod document;
mod errors;
mod store;

pub use collection::{Coll, MongoCollection};
pub use counter::Counter;
pub use store::MongoStore;
