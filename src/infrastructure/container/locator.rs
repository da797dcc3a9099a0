//! 服务查找能力
//!
//! `Container` 与 `CompositeContainer` 都实现 [`ServiceLocator`]；定义在解析时只拿到
//! `&dyn ServiceLocator`，因此嵌套依赖总是回到同一个查找入口。

use super::definition::Params;
use super::instance::Instance;
use crate::errors::{ContainerError, Result};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

/// 容器自身（顶层查找能力）的默认标识符
pub const LOCATOR_ID: &str = "service_locator";

/// 默认注入器的标识符
pub const INJECTOR_ID: &str = "injector";

/// 服务查找 trait
pub trait ServiceLocator: Send + Sync {
    /// 标识符是否可以被解析
    fn has(&self, id: &str) -> bool;

    /// 带参数解析
    fn get_with(&self, id: &str, params: &Params) -> Result<Instance>;

    fn get(&self, id: &str) -> Result<Instance> {
        self.get_with(id, &Params::new())
    }

    /// 指向自身的弱引用句柄
    fn locator_ref(&self) -> LocatorRef;
}

/// 带类型转换的便捷方法
pub trait ServiceLocatorExt: ServiceLocator {
    fn get_typed<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        let instance = self.get(id)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ContainerError::TypeCastFailed {
                id: id.to_string(),
                expected: type_name::<T>(),
                actual: instance.type_name(),
            })
    }
}

impl<L: ServiceLocator + ?Sized> ServiceLocatorExt for L {}

/// 对查找能力的弱引用
///
/// 绑定在 [`LOCATOR_ID`] 下的值就是它：实例缓存持有强引用时不会让容器引用自身。
#[derive(Clone)]
pub struct LocatorRef {
    inner: Weak<dyn ServiceLocator>,
}

impl LocatorRef {
    pub fn new(inner: Weak<dyn ServiceLocator>) -> Self {
        Self { inner }
    }

    pub fn upgrade(&self) -> Result<Arc<dyn ServiceLocator>> {
        self.inner
            .upgrade()
            .ok_or_else(|| ContainerError::invalid("service locator has already been dropped"))
    }

    /// 是否指向给定的对象
    pub fn points_to<T: ?Sized>(&self, target: &Arc<T>) -> bool {
        std::ptr::addr_eq(self.inner.as_ptr(), Arc::as_ptr(target))
    }

    pub fn get(&self, id: &str) -> Result<Instance> {
        self.upgrade()?.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner.upgrade().is_some_and(|locator| locator.has(id))
    }
}

impl fmt::Debug for LocatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorRef")
            .field("ptr", &self.inner.as_ptr())
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
