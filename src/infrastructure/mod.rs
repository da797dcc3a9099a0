//! 基础设施层
//!
//! - 依赖注入容器
//! - 服务提供者
//! - 注入器

pub mod container;
pub mod injector;
pub mod provider;

pub use container::{Container, ContainerBuilder, Instance, RawDefinition, ServiceLocator};
pub use injector::Injector;
pub use provider::{DeferredServiceProvider, Provider, ProviderSpec, ServiceProvider};
