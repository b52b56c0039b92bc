//! Registry abstraction trait definition

mod mapper_registry;

pub use mapper_registry::{InMemoryMapperRegistry, MapperRegistry};
