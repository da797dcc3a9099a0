//! 注入器
//!
//! 默认绑定在 `INJECTOR_ID` 下，持有查找目标的弱引用，给调用方提供“拿着容器执行闭包”的入口。

use super::container::{Instance, LocatorRef, ServiceLocator, ServiceLocatorExt};
use crate::errors::Result;
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Injector {
    locator: LocatorRef,
}

impl Injector {
    pub fn new(locator: LocatorRef) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &LocatorRef {
        &self.locator
    }

    /// 以查找目标调用闭包
    pub fn invoke<R, F>(&self, callable: F) -> Result<R>
    where
        F: FnOnce(&dyn ServiceLocator) -> Result<R>,
    {
        let locator = self.locator.upgrade()?;
        callable(locator.as_ref())
    }

    /// 按顺序解析多个标识符，遇到第一个错误即返回
    pub fn resolve_all<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Instance>> {
        let locator = self.locator.upgrade()?;
        ids.iter().map(|id| locator.get(id.as_ref())).collect()
    }

    pub fn get_typed<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        self.locator.upgrade()?.get_typed::<T>(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::container::{Container, RawDefinition, INJECTOR_ID};

    #[test]
    fn test_default_injector_resolves_through_container() {
        let container = Container::new();
        container.set("port", RawDefinition::value(8080u16)).unwrap();
        container.set("host", RawDefinition::value("localhost")).unwrap();

        let injector = container.get_typed::<Injector>(INJECTOR_ID).unwrap();
        assert!(injector.locator().points_to(&container));

        let port = injector.get_typed::<u16>("port").unwrap();
        assert_eq!(*port, 8080);

        let both = injector.resolve_all(&["host", "port"]).unwrap();
        assert_eq!(both.len(), 2);

        let address = injector
            .invoke(|locator| {
                let host = locator.get_typed::<&str>("host")?;
                let port = locator.get_typed::<u16>("port")?;
                Ok(format!("{}:{}", host, port))
            })
            .unwrap();
        assert_eq!(address, "localhost:8080");
    }

    #[test]
    fn test_injector_fails_after_container_dropped() {
        let container = Container::new();
        let injector = container.get_typed::<Injector>(INJECTOR_ID).unwrap();
        drop(container);
        assert!(injector.resolve_all(&["anything"]).is_err());
    }
}
