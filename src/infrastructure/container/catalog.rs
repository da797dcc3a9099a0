//! 可实例化类型目录
//!
//! 标识符没有注册定义时，容器会到这里查找同名类型并直接构造。

use super::definition::{FactoryFn, Params};
use super::instance::Instance;
use super::locator::ServiceLocator;
use crate::errors::{ContainerError, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 目录条目
#[derive(Clone)]
pub enum TypeEntry {
    /// 可构造
    Concrete(Arc<FactoryFn>),
    /// 已知但不可构造（类似抽象类型或接口）
    Abstract,
}

#[derive(Default)]
pub struct TypeCatalog {
    entries: RwLock<HashMap<String, TypeEntry>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T, F>(&self, name: impl Into<String>, constructor: F)
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceLocator, &Params) -> Result<T> + Send + Sync + 'static,
    {
        let constructor: Arc<FactoryFn> =
            Arc::new(move |locator: &dyn ServiceLocator, params: &Params| {
                constructor(locator, params).map(Instance::new)
            });
        self.entries
            .write()
            .insert(name.into(), TypeEntry::Concrete(constructor));
    }

    /// 以 `Default` 构造
    pub fn register_default<T: Default + Any + Send + Sync>(&self, name: impl Into<String>) {
        self.register(name, |_: &dyn ServiceLocator, _: &Params| Ok(T::default()));
    }

    pub fn register_abstract(&self, name: impl Into<String>) {
        self.entries.write().insert(name.into(), TypeEntry::Abstract);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn is_instantiable(&self, name: &str) -> bool {
        matches!(self.entries.read().get(name), Some(TypeEntry::Concrete(_)))
    }

    pub fn instantiate(
        &self,
        name: &str,
        locator: &dyn ServiceLocator,
        params: &Params,
    ) -> Result<Instance> {
        // 构造函数可能再次访问目录，先释放读锁
        let entry = self.entries.read().get(name).cloned();
        match entry {
            Some(TypeEntry::Concrete(constructor)) => constructor(locator, params),
            Some(TypeEntry::Abstract) => Err(ContainerError::NotInstantiable {
                id: name.to_string(),
                reason: "type is registered as abstract".to_string(),
            }),
            None => Err(ContainerError::not_found(name)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
