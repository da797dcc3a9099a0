//! 运行时对象解析引擎
//!
//! 按标识符登记服务定义，首次请求时惰性构建并缓存实例；支持循环引用检测、
//! 标签聚合、缓存标记失效、延迟服务提供者以及向 root 容器的委托查找。

pub mod config;
pub mod errors;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::ContainerConfig;
pub use errors::{ConfigError, ContainerError, Result};
pub use infrastructure::container::{
    CompositeContainer, Container, ContainerBuilder, ContainerStats, Definition, Instance,
    LocatorRef, Params, RawDefinition, Resetable, ServiceLocator, ServiceLocatorExt, TypeCatalog,
    INJECTOR_ID, LOCATOR_ID,
};
pub use infrastructure::injector::Injector;
pub use infrastructure::provider::{
    DeferredServiceProvider, Provider, ProviderSpec, ServiceProvider,
};
