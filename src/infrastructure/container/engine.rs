//! 解析引擎
//!
//! `get` 的流程：标签别名 -> 缓存标记检查 -> 实例缓存 -> 按标识符加构建锁 -> 带循环检测的构建 -> 缓存结果。
//! 构建时定义针对查找目标（挂载了 root 时是组合容器，否则是容器自身）解析，所以嵌套
//! 依赖会重新进入同一个引擎并共享同一个构建链。

use super::building::{BuildLock, BuildLocks, BuildingSet};
use super::catalog::TypeCatalog;
use super::composite::CompositeContainer;
use super::definition::{
    DefinitionMeta, InjectorDefinition, LocatorDefinition, Normalizer, Params, RawDefinition,
};
use super::instance::Instance;
use super::locator::{LocatorRef, ServiceLocator, INJECTOR_ID, LOCATOR_ID};
use super::registry::{DefinitionRegistry, StoredDefinition};
use super::stats::{ContainerStats, InnerStats};
use super::tags::TagIndex;
use crate::config::ContainerConfig;
use crate::errors::{ContainerError, Result};
use crate::infrastructure::provider::{DeferredSlot, Provider, ProviderSpec};
use crate::logging::OperationTimer;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// 缓存的实例及其缓存标记
#[derive(Clone)]
struct CachedInstance {
    instance: Instance,
    token: Option<String>,
}

/// 服务容器
pub struct Container {
    config: ContainerConfig,
    registry: RwLock<DefinitionRegistry>,
    instances: DashMap<String, CachedInstance>,
    building: BuildingSet,
    build_locks: BuildLocks,
    normalizer: Normalizer,
    /// 挂载 root 后创建，由容器独占
    root: RwLock<Option<Arc<CompositeContainer>>>,
    self_ref: Weak<Container>,
    stats: InnerStats,
}

impl Container {
    /// 创建只带默认绑定的容器
    pub fn new() -> Arc<Self> {
        let container = Self::create(
            ContainerConfig::default(),
            Arc::new(TypeCatalog::new()),
            TagIndex::new(),
        );
        container.register_defaults();
        container
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    fn create(config: ContainerConfig, catalog: Arc<TypeCatalog>, tags: TagIndex) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            registry: RwLock::new(DefinitionRegistry::with_tags(tags)),
            instances: DashMap::new(),
            building: BuildingSet::new(),
            build_locks: BuildLocks::new(),
            normalizer: Normalizer::new(catalog),
            root: RwLock::new(None),
            self_ref: self_ref.clone(),
            stats: InnerStats::default(),
        })
    }

    /// 查找能力自身与注入器
    fn register_defaults(&self) {
        let mut registry = self.registry.write();
        registry.insert(
            LOCATOR_ID,
            StoredDefinition::Resolvable(Arc::new(LocatorDefinition)),
            DefinitionMeta::default(),
        );
        registry.insert(
            INJECTOR_ID,
            StoredDefinition::Resolvable(Arc::new(InjectorDefinition)),
            DefinitionMeta::default(),
        );
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        self.normalizer.catalog()
    }

    pub fn stats(&self) -> ContainerStats {
        self.stats.snapshot()
    }

    /// 注册定义
    ///
    /// 元数据中的标签写入标签索引，已缓存的实例被清除。
    pub fn set(&self, id: impl Into<String>, definition: impl Into<RawDefinition>) -> Result<()> {
        let id = id.into();
        self.validate_identifier(&id)?;
        let raw = definition.into();
        if self.config.validate {
            self.normalizer.validate(&raw)?;
        }

        let (inner, meta) = self.normalizer.split(raw)?;
        let stored = match inner {
            RawDefinition::Deferred(slot) => StoredDefinition::Deferred(slot),
            other => StoredDefinition::Resolvable(self.normalizer.normalize(other, Some(&id))?),
        };
        let tags = meta.tags.len();

        self.registry.write().insert(&id, stored, meta);
        self.instances.remove(&id);
        debug!(id = %id, tags, "Definition registered");
        Ok(())
    }

    /// 按输入顺序逐个 `set`，遇到错误立即返回
    pub fn set_multiple<I, K, D>(&self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<RawDefinition>,
    {
        for (id, definition) in definitions {
            self.set(id, definition)?;
        }
        Ok(())
    }

    pub fn has(&self, id: &str) -> bool {
        if let Some(tag) = self.tag_alias(id) {
            return self.registry.read().tags().has_members(tag);
        }
        self.registry.read().contains(id) || self.catalog().is_instantiable(id)
    }

    pub fn get(&self, id: &str) -> Result<Instance> {
        self.get_with(id, &Params::new())
    }

    /// 解析服务
    ///
    /// 参数只影响首次构建；缓存命中时原样返回已有实例。
    pub fn get_with(&self, id: &str, params: &Params) -> Result<Instance> {
        if let Some(tag) = self.tag_alias(id) {
            return self.get_tagged(tag).map(Instance::new);
        }

        self.stats.resolution();
        if self.config.trace_resolutions {
            trace!(id, "Resolving service");
        }

        let token = self.refresh_stale(id)?;
        if let Some(instance) = self.cached(id) {
            return Ok(instance);
        }

        // 当前线程正在构建它：循环引用，或查找能力的自引用
        if self.building.is_building(id) {
            self.stats.miss();
            return self.build(id, params);
        }

        let _lock = self.lock_build(id)?;
        // 等待期间可能已由其他线程构建完成
        if let Some(instance) = self.cached(id) {
            return Ok(instance);
        }

        self.stats.miss();
        let instance = self.build(id, params)?;
        self.instances.insert(
            id.to_string(),
            CachedInstance {
                instance: instance.clone(),
                token,
            },
        );
        Ok(instance)
    }

    /// 标签下全部服务，按登记顺序
    pub fn get_tagged(&self, tag: &str) -> Result<Vec<Instance>> {
        let members = self.registry.read().tags().members(tag).to_vec();
        members.iter().map(|id| self.get(id)).collect()
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// 已注册的标识符
    pub fn ids(&self) -> Vec<String> {
        self.registry.read().ids()
    }

    pub fn tags_of(&self, id: &str) -> Vec<String> {
        self.registry
            .read()
            .tags()
            .tags_of(id)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn add_providers<I, P>(&self, providers: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderSpec>,
    {
        for provider in providers {
            self.add_provider(provider)?;
        }
        Ok(())
    }

    pub fn add_provider(&self, spec: impl Into<ProviderSpec>) -> Result<()> {
        let provider = match spec.into() {
            ProviderSpec::Provider(provider) => provider,
            ProviderSpec::Definition(raw) => self.resolve_provider(raw)?,
        };

        match provider {
            Provider::Deferred(provider) => {
                let slot = Arc::new(DeferredSlot::new(provider));
                let provides = slot.provides();
                debug!(provides = ?provides, "Binding deferred service provider");
                for id in provides {
                    self.set(id, RawDefinition::Deferred(slot.clone()))?;
                }
                Ok(())
            }
            Provider::Eager(provider) => {
                debug!("Registering service provider");
                provider.register(self)
            }
        }
    }

    fn resolve_provider(&self, raw: RawDefinition) -> Result<Provider> {
        let definition = self.normalizer.normalize(raw, None)?;
        let instance = self.with_target(|target| definition.resolve(target, &Params::new()))?;
        match instance.downcast::<Provider>() {
            Some(provider) => Ok((*provider).clone()),
            None => Err(ContainerError::invalid(format!(
                "Service provider should be an instance of {}. {} given.",
                std::any::type_name::<Provider>(),
                instance.type_name()
            ))),
        }
    }

    /// 挂载 root 委托
    ///
    /// 挂载后所有构建期间的依赖查找都经由组合容器进行。容器只保存弱引用，调用方负责
    /// 保持委托存活。
    pub fn delegate_lookup(&self, delegate: &Arc<dyn ServiceLocator>) {
        let delegates = {
            let mut root = self.root.write();
            let composite = root.get_or_insert_with(CompositeContainer::new);
            composite.attach_shared(delegate);
            composite.len()
        };
        // 默认绑定指向查找目标，挂载后需要重新解析
        self.instances.remove(LOCATOR_ID);
        self.instances.remove(INJECTOR_ID);
        debug!(delegates, "Root delegate attached");
    }

    fn validate_identifier(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(ContainerError::invalid(
                "service identifier must be a non-empty string",
            ));
        }
        if self.tag_alias(id).is_some() {
            return Err(ContainerError::invalid(format!(
                "service identifier \"{}\" starts with the tag prefix \"{}\"",
                id, self.config.tag_prefix
            )));
        }
        Ok(())
    }

    fn tag_alias<'a>(&self, id: &'a str) -> Option<&'a str> {
        id.strip_prefix(self.config.tag_prefix.as_str())
    }

    /// 以查找目标调用闭包；不持有 root 锁
    fn with_target<R>(&self, f: impl FnOnce(&dyn ServiceLocator) -> R) -> R {
        let root = self.root.read().clone();
        match root {
            Some(root) => f(&*root),
            None => f(self),
        }
    }

    /// 计算缓存标记；实例已过期时重置或丢弃
    fn refresh_stale(&self, id: &str) -> Result<Option<String>> {
        let evaluator = self.registry.read().cache_tag(id);
        let Some(evaluator) = evaluator else {
            return Ok(None);
        };
        let token = self.with_target(|target| evaluator(target));

        let stale = self
            .instances
            .get(id)
            .filter(|cached| cached.token.as_deref() != Some(token.as_str()))
            .map(|cached| cached.instance.clone());

        if let Some(instance) = stale {
            let hook = self.registry.read().reset_hook(id);
            match hook {
                Some(hook) => {
                    if let Err(err) = hook(&instance) {
                        // 重置失败的实例不再复用，下次解析重新构建
                        self.instances.remove(id);
                        self.stats.invalidation();
                        return Err(err);
                    }
                    if let Some(mut cached) = self.instances.get_mut(id) {
                        cached.token = Some(token.clone());
                    }
                    self.stats.reset();
                    debug!(id, token = %token, "Cached instance reset");
                }
                None => {
                    self.instances.remove(id);
                    self.stats.invalidation();
                    debug!(id, token = %token, "Cached instance invalidated");
                }
            }
        }
        Ok(Some(token))
    }

    fn cached(&self, id: &str) -> Option<Instance> {
        let instance = self.instances.get(id).map(|cached| cached.instance.clone());
        if instance.is_some() {
            self.stats.hit();
        }
        instance
    }

    /// 获取构建锁；跨线程的等待环报告为循环引用
    fn lock_build(&self, key: &str) -> Result<BuildLock<'_>> {
        self.build_locks.acquire(key).map_err(|walked| {
            let id = walked.last().cloned().unwrap_or_else(|| key.to_string());
            let mut chain = self.building.chain();
            chain.extend(walked);
            debug!(id = %id, chain = ?chain, "Circular reference detected across threads");
            ContainerError::CircularReference { id, chain }
        })
    }

    /// 执行延迟提供者的注册，每个占位成功一次
    fn materialize(&self, slot: &DeferredSlot) -> Result<()> {
        let key = slot.key();
        if slot.is_registered() || self.building.is_building(key) {
            return Ok(());
        }
        let _lock = self.lock_build(key)?;
        if slot.is_registered() {
            return Ok(());
        }
        let _guard = self
            .building
            .enter(key)
            .map_err(|chain| ContainerError::CircularReference {
                id: key.to_string(),
                chain,
            })?;
        slot.register(self)
    }

    fn build(&self, id: &str, params: &Params) -> Result<Instance> {
        let _guard = match self.building.enter(id) {
            Ok(guard) => guard,
            Err(_) if id == LOCATOR_ID => {
                trace!("Service locator requested while building itself");
                return Ok(self.with_target(|target| Instance::new(target.locator_ref())));
            }
            Err(chain) => {
                debug!(id, chain = ?chain, "Circular reference detected");
                return Err(ContainerError::CircularReference {
                    id: id.to_string(),
                    chain,
                });
            }
        };

        self.stats.build();
        let timer = OperationTimer::new("build", id);
        let instance = self.build_internal(id, params)?;
        timer.finish();
        Ok(instance)
    }

    fn build_internal(&self, id: &str, params: &Params) -> Result<Instance> {
        let stored = self.registry.read().get(id);
        match stored {
            Some(StoredDefinition::Resolvable(definition)) => {
                self.with_target(|target| definition.resolve(target, params))
            }
            Some(StoredDefinition::Deferred(slot)) => {
                self.materialize(&slot)?;
                if self.registry.write().discard_placeholder(id, &slot) {
                    debug!(id, "Deferred provider did not register its declared identifier");
                }
                self.build_internal(id, params)
            }
            None if self.catalog().contains(id) => {
                let definition = self.normalizer.normalize(RawDefinition::Implicit, Some(id))?;
                self.with_target(|target| definition.resolve(target, params))
            }
            None => Err(ContainerError::not_found(id)),
        }
    }
}

impl ServiceLocator for Container {
    fn has(&self, id: &str) -> bool {
        Container::has(self, id)
    }

    fn get_with(&self, id: &str, params: &Params) -> Result<Instance> {
        Container::get_with(self, id, params)
    }

    fn locator_ref(&self) -> LocatorRef {
        let self_ref: Weak<dyn ServiceLocator> = self.self_ref.clone();
        LocatorRef::new(self_ref)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.registry.read().len())
            .field("instances", &self.instances.len())
            .field("delegated", &self.root.read().is_some())
            .finish()
    }
}

/// 容器构建器
///
/// 构建顺序：标签、root 委托、默认绑定、定义、提供者。后注册的定义覆盖默认绑定。
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    catalog: Option<Arc<TypeCatalog>>,
    definitions: Vec<(String, RawDefinition)>,
    providers: Vec<ProviderSpec>,
    tags: Vec<(String, Vec<String>)>,
    root: Option<Arc<dyn ServiceLocator>>,
}

impl ContainerBuilder {
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(mut self, catalog: Arc<TypeCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn definition(mut self, id: impl Into<String>, definition: impl Into<RawDefinition>) -> Self {
        self.definitions.push((id.into(), definition.into()));
        self
    }

    pub fn definitions<I, K, D>(mut self, definitions: I) -> Self
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<RawDefinition>,
    {
        self.definitions.extend(
            definitions
                .into_iter()
                .map(|(id, definition)| (id.into(), definition.into())),
        );
        self
    }

    pub fn provider(mut self, provider: impl Into<ProviderSpec>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderSpec>,
    {
        self.providers.extend(providers.into_iter().map(Into::into));
        self
    }

    /// 初始标签表
    pub fn tag<I, S>(mut self, tag: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .push((tag.into(), ids.into_iter().map(Into::into).collect()));
        self
    }

    /// 挂载 root 委托（容器只保存弱引用）
    pub fn root(mut self, root: Arc<dyn ServiceLocator>) -> Self {
        self.root = Some(root);
        self
    }

    pub fn build(self) -> Result<Arc<Container>> {
        let tags = TagIndex::from_map(self.tags)?;
        let catalog = self.catalog.unwrap_or_default();
        let container = Container::create(self.config, catalog, tags);

        if let Some(root) = &self.root {
            container.delegate_lookup(root);
        }
        container.register_defaults();
        container.set_multiple(self.definitions)?;
        container.add_providers(self.providers)?;

        debug!(
            definitions = container.registry.read().len(),
            "Container built"
        );
        Ok(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::container::ServiceLocatorExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter {
        id: usize,
    }

    #[test]
    fn test_singleton_identity() {
        let container = Container::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        container
            .set(
                "counter",
                RawDefinition::factory(move |_, _| {
                    Ok(Counter {
                        id: counter_clone.fetch_add(1, Ordering::SeqCst),
                    })
                }),
            )
            .unwrap();

        let first = container.get("counter").unwrap();
        let second = container.get("counter").unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let stats = container.stats();
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.builds, 1);
    }

    #[test]
    fn test_set_clears_cached_instance() {
        let container = Container::new();
        container.set("n", RawDefinition::factory(|_, _| Ok(Counter { id: 1 }))).unwrap();
        let old = container.get("n").unwrap();
        assert!(container.is_cached("n"));

        container.set("n", RawDefinition::factory(|_, _| Ok(Counter { id: 2 }))).unwrap();
        assert!(!container.is_cached("n"));
        let new = container.get("n").unwrap();
        assert!(!old.ptr_eq(&new));
        assert_eq!(new.downcast::<Counter>().unwrap().id, 2);
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let container = Container::new();
        let err = container.set("", RawDefinition::value(1u8)).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let config = ContainerConfig {
            validate: false,
            ..ContainerConfig::default()
        };
        let container = Container::builder().config(config).build().unwrap();
        // 形状校验关闭后空引用可以注册，解析时才失败
        assert!(container.set("alias", RawDefinition::reference("")).is_ok());
        assert!(container.get("alias").is_err());

        let strict = Container::new();
        assert!(strict.set("alias", RawDefinition::reference("")).is_err());
    }

    #[test]
    fn test_defaults_can_be_overridden() {
        let container = Container::builder()
            .definition(INJECTOR_ID, RawDefinition::value("custom injector"))
            .build()
            .unwrap();
        let injector = container.get_typed::<&str>(INJECTOR_ID).unwrap();
        assert_eq!(*injector, "custom injector");
    }

    #[test]
    fn test_locator_binding_is_container() {
        let container = Container::new();
        let locator = container.get_typed::<LocatorRef>(LOCATOR_ID).unwrap();
        assert!(locator.points_to(&container));
        let again = container.get(LOCATOR_ID).unwrap();
        assert!(again.downcast::<LocatorRef>().is_some());
    }

    #[test]
    fn test_custom_tag_prefix() {
        let config = ContainerConfig {
            tag_prefix: "group:".to_string(),
            ..ContainerConfig::default()
        };
        let container = Container::builder()
            .config(config)
            .definition("a", RawDefinition::value(1u8).tagged(["nums"]))
            .build()
            .unwrap();
        assert!(container.has("group:nums"));
        assert!(!container.has("tag@nums"));
        let list = container.get("group:nums").unwrap().as_list().unwrap();
        assert_eq!(list.len(), 1);
    }
}
