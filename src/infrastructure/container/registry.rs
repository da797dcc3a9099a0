//! 定义注册表
//!
//! 只保存数据；加锁、缓存失效和解析都由 `Container` 负责。

use super::definition::{CacheTagFn, Definition, DefinitionMeta, ResetFn};
use super::tags::TagIndex;
use crate::infrastructure::provider::DeferredSlot;
use std::collections::HashMap;
use std::sync::Arc;

/// 注册表中保存的定义
#[derive(Clone)]
pub(crate) enum StoredDefinition {
    Resolvable(Arc<dyn Definition>),
    Deferred(Arc<DeferredSlot>),
}

#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, StoredDefinition>,
    cache_tags: HashMap<String, Arc<CacheTagFn>>,
    resets: HashMap<String, Arc<ResetFn>>,
    tags: TagIndex,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(tags: TagIndex) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// 保存定义；标签累加，缓存标记计算器与重置钩子随新定义替换
    pub(crate) fn insert(&mut self, id: &str, definition: StoredDefinition, meta: DefinitionMeta) {
        for tag in meta.tags {
            self.tags.add(&tag, id.to_string());
        }
        match meta.cache_tag {
            Some(evaluator) => {
                self.cache_tags.insert(id.to_string(), evaluator);
            }
            None => {
                self.cache_tags.remove(id);
            }
        }
        match meta.reset {
            Some(hook) => {
                self.resets.insert(id.to_string(), hook);
            }
            None => {
                self.resets.remove(id);
            }
        }
        self.definitions.insert(id.to_string(), definition);
    }

    pub(crate) fn get(&self, id: &str) -> Option<StoredDefinition> {
        self.definitions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// 若 `id` 仍绑定在同一个占位上则移除它，返回是否移除
    pub(crate) fn discard_placeholder(&mut self, id: &str, slot: &Arc<DeferredSlot>) -> bool {
        let still_bound = matches!(
            self.definitions.get(id),
            Some(StoredDefinition::Deferred(bound)) if Arc::ptr_eq(bound, slot)
        );
        if still_bound {
            self.definitions.remove(id);
        }
        still_bound
    }

    pub fn cache_tag(&self, id: &str) -> Option<Arc<CacheTagFn>> {
        self.cache_tags.get(id).cloned()
    }

    pub fn reset_hook(&self, id: &str) -> Option<Arc<ResetFn>> {
        self.resets.get(id).cloned()
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    /// 已注册的标识符（排序后）
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.definitions.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
