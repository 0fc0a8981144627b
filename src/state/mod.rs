//! State tree: values, schemas, stores and updates

pub mod schema;
pub mod store;
pub mod update;
pub mod value;

pub use schema::{Divider, PortsSchema, Schema, SchemaTree, Updater};
pub use store::Store;
pub use update::{AgentSpec, Command, Division, LeafWrite, LocatedCommand, Update};
pub use value::Value;
