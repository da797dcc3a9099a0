//! 组合容器（委托链）
//!
//! 按挂载顺序依次询问各个委托容器，第一个成功的结果胜出。

use super::definition::Params;
use super::instance::Instance;
use super::locator::{LocatorRef, ServiceLocator};
use crate::errors::{ContainerError, Result};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::trace;

/// 委托引用
enum Delegate {
    /// 由组合容器持有
    Owned(Arc<dyn ServiceLocator>),
    /// 生命周期由外部管理，失效后跳过
    Shared(Weak<dyn ServiceLocator>),
}

impl Delegate {
    fn upgrade(&self) -> Option<Arc<dyn ServiceLocator>> {
        match self {
            Delegate::Owned(locator) => Some(locator.clone()),
            Delegate::Shared(locator) => locator.upgrade(),
        }
    }
}

pub struct CompositeContainer {
    delegates: RwLock<Vec<Delegate>>,
    self_ref: Weak<CompositeContainer>,
}

impl CompositeContainer {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            delegates: RwLock::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// 追加并持有一个委托
    pub fn attach(&self, delegate: Arc<dyn ServiceLocator>) {
        self.delegates.write().push(Delegate::Owned(delegate));
    }

    /// 追加一个不持有的委托
    pub fn attach_shared(&self, delegate: &Arc<dyn ServiceLocator>) {
        self.delegates
            .write()
            .push(Delegate::Shared(Arc::downgrade(delegate)));
    }

    pub fn len(&self) -> usize {
        self.delegates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.read().is_empty()
    }

    /// 仍然存活的委托快照；解析时不持有锁
    fn live_delegates(&self) -> Vec<Arc<dyn ServiceLocator>> {
        self.delegates
            .read()
            .iter()
            .filter_map(Delegate::upgrade)
            .collect()
    }
}

impl ServiceLocator for CompositeContainer {
    fn has(&self, id: &str) -> bool {
        self.live_delegates().iter().any(|delegate| delegate.has(id))
    }

    fn get_with(&self, id: &str, params: &Params) -> Result<Instance> {
        let mut last_error = None;
        for (index, delegate) in self.live_delegates().into_iter().enumerate() {
            if !delegate.has(id) {
                continue;
            }
            match delegate.get_with(id, params) {
                Ok(instance) => return Ok(instance),
                Err(err) => {
                    trace!(id, delegate = index, error = %err, "Delegate failed to resolve");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ContainerError::not_found(id)))
    }

    fn locator_ref(&self) -> LocatorRef {
        let self_ref: Weak<dyn ServiceLocator> = self.self_ref.clone();
        LocatorRef::new(self_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::container::{Container, RawDefinition};

    #[test]
    fn test_first_delegate_wins() {
        let first = Container::new();
        let second = Container::new();
        first.set("name", RawDefinition::value("first")).unwrap();
        second.set("name", RawDefinition::value("second")).unwrap();
        second.set("only_second", RawDefinition::value(2u8)).unwrap();

        let composite = CompositeContainer::new();
        composite.attach(first.clone());
        composite.attach(second.clone());

        let name = composite.get("name").unwrap();
        assert_eq!(*name.downcast::<&str>().unwrap(), "first");
        assert!(composite.has("only_second"));
        assert!(!composite.has("missing"));
        assert!(composite.get("missing").unwrap_err().is_not_found_for("missing"));
        assert_eq!(composite.len(), 2);
    }

    #[test]
    fn test_dropped_shared_delegate_is_skipped() {
        let composite = CompositeContainer::new();
        {
            let temporary: Arc<dyn ServiceLocator> = Container::new();
            composite.attach_shared(&temporary);
            assert!(composite.has(crate::LOCATOR_ID));
        }
        assert!(!composite.has(crate::LOCATOR_ID));
        assert_eq!(composite.len(), 1);
    }

    #[test]
    fn test_last_failure_is_surfaced() {
        let failing = Container::new();
        failing
            .set(
                "svc",
                RawDefinition::factory(|_, _| -> Result<u8> {
                    Err(ContainerError::invalid("broken"))
                }),
            )
            .unwrap();
        let composite = CompositeContainer::new();
        composite.attach(failing);

        let err = composite.get("svc").unwrap_err();
        assert!(matches!(err, ContainerError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_locator_ref_points_to_self() {
        let composite = CompositeContainer::new();
        assert!(composite.locator_ref().points_to(&composite));
    }
}
