//! 服务定义
//!
//! 注册边界上的定义是一个封闭的枚举 [`RawDefinition`]；注册表在 `set` 时把元数据
//! （标签、缓存标记计算器、重置钩子）剥离出来，再由 [`Normalizer`] 把剩余部分转换成
//! 只有一个 `resolve` 方法的 [`Definition`]。

use super::catalog::TypeCatalog;
use super::instance::Instance;
use super::locator::ServiceLocator;
use super::tags::validate_tag;
use crate::errors::{ContainerError, Result};
use crate::infrastructure::injector::Injector;
use crate::infrastructure::provider::DeferredSlot;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 解析参数，原样传递给定义
pub type Params = HashMap<String, serde_json::Value>;

/// 工厂函数
pub type FactoryFn = dyn Fn(&dyn ServiceLocator, &Params) -> Result<Instance> + Send + Sync;

/// 缓存标记计算器：返回值变化即表示缓存实例已过期
pub type CacheTagFn = dyn Fn(&dyn ServiceLocator) -> String + Send + Sync;

/// 缓存实例的原地重置钩子
pub type ResetFn = dyn Fn(&Instance) -> Result<()> + Send + Sync;

/// 可以被解析为对象的定义
pub trait Definition: Send + Sync {
    fn resolve(&self, locator: &dyn ServiceLocator, params: &Params) -> Result<Instance>;
}

/// 支持原地刷新的服务
pub trait Resetable: Send + Sync {
    fn reset(&self);
}

/// 定义的带外元数据
#[derive(Clone, Default)]
pub struct DefinitionMeta {
    pub tags: Vec<String>,
    pub cache_tag: Option<Arc<CacheTagFn>>,
    pub reset: Option<Arc<ResetFn>>,
}

impl DefinitionMeta {
    /// 合并外层元数据，外层的计算器与钩子优先
    fn merge_outer(mut self, outer: DefinitionMeta) -> Self {
        self.tags.extend(outer.tags);
        self.cache_tag = outer.cache_tag.or(self.cache_tag);
        self.reset = outer.reset.or(self.reset);
        self
    }
}

impl fmt::Debug for DefinitionMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionMeta")
            .field("tags", &self.tags)
            .field("cache_tag", &self.cache_tag.is_some())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

/// 内部定义加元数据
#[derive(Clone, Debug)]
pub struct Configured {
    pub definition: RawDefinition,
    pub meta: DefinitionMeta,
}

/// 注册边界上的原始定义
#[derive(Clone)]
pub enum RawDefinition {
    /// 预先构建好的对象
    Value(Instance),
    /// 类型名，通过 [`TypeCatalog`] 构造
    Type(String),
    /// 标识符本身就是类型名
    Implicit,
    /// 另一个标识符的别名
    Reference(String),
    /// 工厂函数
    Factory(Arc<FactoryFn>),
    /// 外部实现的定义
    Custom(Arc<dyn Definition>),
    /// 带元数据的定义
    Configured(Box<Configured>),
    /// 延迟 provider 的占位定义
    Deferred(Arc<DeferredSlot>),
}

impl RawDefinition {
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        RawDefinition::Value(Instance::new(value))
    }

    pub fn type_ref(name: impl Into<String>) -> Self {
        RawDefinition::Type(name.into())
    }

    pub fn reference(id: impl Into<String>) -> Self {
        RawDefinition::Reference(id.into())
    }

    pub fn custom<D: Definition + 'static>(definition: D) -> Self {
        RawDefinition::Custom(Arc::new(definition))
    }

    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceLocator, &Params) -> Result<T> + Send + Sync + 'static,
    {
        RawDefinition::Factory(Arc::new(move |locator: &dyn ServiceLocator, params: &Params| {
            factory(locator, params).map(Instance::new)
        }))
    }

    /// 工厂返回任意错误时包装为 `CreationFailed`
    pub fn try_factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceLocator, &Params) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        RawDefinition::Factory(Arc::new(move |locator: &dyn ServiceLocator, params: &Params| {
            factory(locator, params)
                .map(Instance::new)
                .map_err(|e| ContainerError::creation_failed(type_name::<T>(), e))
        }))
    }

    pub fn tagged<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut configured = self.into_configured();
        configured.meta.tags.extend(tags.into_iter().map(Into::into));
        RawDefinition::Configured(Box::new(configured))
    }

    pub fn with_cache_tag<F>(self, evaluator: F) -> Self
    where
        F: Fn(&dyn ServiceLocator) -> String + Send + Sync + 'static,
    {
        let mut configured = self.into_configured();
        configured.meta.cache_tag = Some(Arc::new(evaluator));
        RawDefinition::Configured(Box::new(configured))
    }

    pub fn with_reset<F>(self, hook: F) -> Self
    where
        F: Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    {
        let mut configured = self.into_configured();
        configured.meta.reset = Some(Arc::new(hook));
        RawDefinition::Configured(Box::new(configured))
    }

    /// 声明实例类型 `T` 支持 [`Resetable`]
    pub fn resetable<T: Resetable + Any>(self) -> Self {
        self.with_reset(|instance: &Instance| match instance.downcast::<T>() {
            Some(service) => {
                service.reset();
                Ok(())
            }
            None => Err(ContainerError::invalid(format!(
                "reset hook expects {} but the cached instance is {}",
                type_name::<T>(),
                instance.type_name()
            ))),
        })
    }

    fn into_configured(self) -> Configured {
        match self {
            RawDefinition::Configured(configured) => *configured,
            definition => Configured {
                definition,
                meta: DefinitionMeta::default(),
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RawDefinition::Value(_) => "value",
            RawDefinition::Type(_) => "type",
            RawDefinition::Implicit => "implicit",
            RawDefinition::Reference(_) => "reference",
            RawDefinition::Factory(_) => "factory",
            RawDefinition::Custom(_) => "custom",
            RawDefinition::Configured(_) => "configured",
            RawDefinition::Deferred(_) => "deferred",
        }
    }
}

impl From<Instance> for RawDefinition {
    fn from(instance: Instance) -> Self {
        RawDefinition::Value(instance)
    }
}

impl fmt::Debug for RawDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawDefinition::Value(instance) => f.debug_tuple("Value").field(instance).finish(),
            RawDefinition::Type(name) => f.debug_tuple("Type").field(name).finish(),
            RawDefinition::Reference(id) => f.debug_tuple("Reference").field(id).finish(),
            RawDefinition::Configured(configured) => {
                f.debug_tuple("Configured").field(configured).finish()
            }
            other => f.write_str(other.kind()),
        }
    }
}

/// 把原始定义转换为可解析单元
#[derive(Clone)]
pub struct Normalizer {
    catalog: Arc<TypeCatalog>,
}

impl Normalizer {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// 剥离元数据，返回内部定义
    ///
    /// 嵌套的 `Configured` 会被展开合并；标签总是会被校验。
    pub fn split(&self, raw: RawDefinition) -> Result<(RawDefinition, DefinitionMeta)> {
        let mut layers = Vec::new();
        let mut current = raw;
        while let RawDefinition::Configured(configured) = current {
            let Configured { definition, meta } = *configured;
            layers.push(meta);
            current = definition;
        }

        let meta = layers
            .into_iter()
            .rev()
            .fold(DefinitionMeta::default(), DefinitionMeta::merge_outer);
        for tag in &meta.tags {
            validate_tag(tag)?;
        }
        Ok((current, meta))
    }

    /// 最小形状校验
    pub fn validate(&self, raw: &RawDefinition) -> Result<()> {
        match raw {
            RawDefinition::Type(name) if name.trim().is_empty() => {
                Err(ContainerError::invalid("type definition requires a non-empty type name"))
            }
            RawDefinition::Reference(id) if id.trim().is_empty() => {
                Err(ContainerError::invalid("reference definition requires a non-empty identifier"))
            }
            RawDefinition::Configured(configured) => {
                for tag in &configured.meta.tags {
                    validate_tag(tag)?;
                }
                self.validate(&configured.definition)
            }
            _ => Ok(()),
        }
    }

    pub fn normalize(&self, raw: RawDefinition, id: Option<&str>) -> Result<Arc<dyn Definition>> {
        let definition: Arc<dyn Definition> = match raw {
            RawDefinition::Value(instance) => Arc::new(ValueDefinition(instance)),
            RawDefinition::Type(name) => Arc::new(TypeDefinition {
                name,
                catalog: self.catalog.clone(),
            }),
            RawDefinition::Implicit => {
                let name = id.ok_or_else(|| {
                    ContainerError::invalid("implicit definition requires an identifier")
                })?;
                Arc::new(TypeDefinition {
                    name: name.to_string(),
                    catalog: self.catalog.clone(),
                })
            }
            RawDefinition::Reference(target) => Arc::new(ReferenceDefinition(target)),
            RawDefinition::Factory(factory) => Arc::new(FactoryDefinition(factory)),
            RawDefinition::Custom(definition) => definition,
            RawDefinition::Configured(configured) => {
                return self.normalize(configured.definition, id);
            }
            RawDefinition::Deferred(_) => {
                return Err(ContainerError::invalid(
                    "a deferred provider placeholder can not be resolved directly",
                ));
            }
        };
        Ok(definition)
    }
}

/// 预构建对象
struct ValueDefinition(Instance);

impl Definition for ValueDefinition {
    fn resolve(&self, _locator: &dyn ServiceLocator, _params: &Params) -> Result<Instance> {
        Ok(self.0.clone())
    }
}

/// 通过类型目录构造
struct TypeDefinition {
    name: String,
    catalog: Arc<TypeCatalog>,
}

impl Definition for TypeDefinition {
    fn resolve(&self, locator: &dyn ServiceLocator, params: &Params) -> Result<Instance> {
        self.catalog.instantiate(&self.name, locator, params)
    }
}

struct ReferenceDefinition(String);

impl Definition for ReferenceDefinition {
    fn resolve(&self, locator: &dyn ServiceLocator, _params: &Params) -> Result<Instance> {
        locator.get(&self.0)
    }
}

struct FactoryDefinition(Arc<FactoryFn>);

impl Definition for FactoryDefinition {
    fn resolve(&self, locator: &dyn ServiceLocator, params: &Params) -> Result<Instance> {
        (self.0)(locator, params)
    }
}

/// 解析为当前查找目标本身
pub(crate) struct LocatorDefinition;

impl Definition for LocatorDefinition {
    fn resolve(&self, locator: &dyn ServiceLocator, _params: &Params) -> Result<Instance> {
        Ok(Instance::new(locator.locator_ref()))
    }
}

pub(crate) struct InjectorDefinition;

impl Definition for InjectorDefinition {
    fn resolve(&self, locator: &dyn ServiceLocator, _params: &Params) -> Result<Instance> {
        Ok(Instance::new(Injector::new(locator.locator_ref())))
    }
}
