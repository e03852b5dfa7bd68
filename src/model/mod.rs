pub mod fixtures;
pub mod mongodb;
pub mod poll;
pub mod store;
