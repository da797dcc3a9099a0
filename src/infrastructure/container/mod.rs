//! Container module
//!
//! 定义注册表、标签索引、解析引擎与组合委托。

mod building;
pub mod catalog;
pub mod composite;
pub mod definition;
pub mod engine;
pub mod instance;
pub mod locator;
pub mod registry;
pub mod stats;
pub mod tags;

pub use catalog::{TypeCatalog, TypeEntry};
pub use composite::CompositeContainer;
pub use definition::{
    CacheTagFn, Configured, Definition, DefinitionMeta, FactoryFn, Normalizer, Params,
    RawDefinition, ResetFn, Resetable,
};
pub use engine::{Container, ContainerBuilder};
pub use instance::Instance;
pub use locator::{LocatorRef, ServiceLocator, ServiceLocatorExt, INJECTOR_ID, LOCATOR_ID};
pub use registry::DefinitionRegistry;
pub use stats::ContainerStats;
pub use tags::{validate_tag, TagIndex};
