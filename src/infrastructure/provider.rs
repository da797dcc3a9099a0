//! 服务提供者
//!
//! 提供者是批量注册的单元：立即型在加入容器时注册定义，延迟型只声明能提供哪些
//! 标识符，首次解析其中任一标识符时才真正注册。

use super::container::{Container, RawDefinition};
use crate::errors::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 立即注册的提供者
pub trait ServiceProvider: Send + Sync {
    fn register(&self, container: &Container) -> Result<()>;
}

/// 延迟注册的提供者
pub trait DeferredServiceProvider: Send + Sync {
    /// 能提供的标识符（有序）
    fn provides(&self) -> Vec<String>;

    fn register(&self, container: &Container) -> Result<()>;
}

/// 提供者的两种形态
#[derive(Clone)]
pub enum Provider {
    Eager(Arc<dyn ServiceProvider>),
    Deferred(Arc<dyn DeferredServiceProvider>),
}

impl Provider {
    pub fn eager<P: ServiceProvider + 'static>(provider: P) -> Self {
        Provider::Eager(Arc::new(provider))
    }

    pub fn deferred<P: DeferredServiceProvider + 'static>(provider: P) -> Self {
        Provider::Deferred(Arc::new(provider))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Provider::Deferred(_))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Eager(_) => f.write_str("Provider::Eager"),
            Provider::Deferred(provider) => f
                .debug_tuple("Provider::Deferred")
                .field(&provider.provides())
                .finish(),
        }
    }
}

/// `add_providers` 的输入
///
/// `Definition` 形式会先被解析，解析结果必须是 [`Provider`]。
#[derive(Debug, Clone)]
pub enum ProviderSpec {
    Provider(Provider),
    Definition(RawDefinition),
}

impl From<Provider> for ProviderSpec {
    fn from(provider: Provider) -> Self {
        ProviderSpec::Provider(provider)
    }
}

impl From<RawDefinition> for ProviderSpec {
    fn from(definition: RawDefinition) -> Self {
        ProviderSpec::Definition(definition)
    }
}

/// 延迟提供者的占位定义
///
/// 同一个提供者声明的所有标识符共享一个占位。注册由容器以 [`DeferredSlot::key`]
/// 为名加构建锁后执行，成功一次之后不再重复。
pub struct DeferredSlot {
    provider: Arc<dyn DeferredServiceProvider>,
    key: String,
    registered: AtomicBool,
}

impl DeferredSlot {
    pub(crate) fn new(provider: Arc<dyn DeferredServiceProvider>) -> Self {
        let key = format!("<provider of {}>", provider.provides().join(", "));
        Self {
            provider,
            key,
            registered: AtomicBool::new(false),
        }
    }

    pub fn provides(&self) -> Vec<String> {
        self.provider.provides()
    }

    /// 构建链与构建锁中代表注册过程的名字
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// 让提供者注册真实定义；失败时保持未注册，之后可以重试
    pub(crate) fn register(&self, container: &Container) -> Result<()> {
        debug!(provides = ?self.provider.provides(), "Registering deferred service provider");
        self.provider.register(container)?;
        self.registered.store(true, Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for DeferredSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredSlot")
            .field("provides", &self.provider.provides())
            .field("registered", &self.is_registered())
            .finish()
    }
}
