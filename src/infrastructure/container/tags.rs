//! 标签索引

use crate::errors::{ContainerError, Result};
use std::collections::HashMap;

/// 校验标签名
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.trim().is_empty() {
        return Err(ContainerError::invalid(format!(
            "invalid tag \"{}\": tags must be non-empty strings",
            tag
        )));
    }
    Ok(())
}

/// 标签 -> 有序、无重复的标识符列表
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    tags: HashMap<String, Vec<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从初始标签表构建，保持各标签内的顺序并去重
    pub fn from_map<I, T, M, S>(map: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, M)>,
        T: Into<String>,
        M: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::new();
        for (tag, members) in map {
            let tag = tag.into();
            validate_tag(&tag)?;
            for id in members {
                index.add(&tag, id.into());
            }
        }
        Ok(index)
    }

    /// 记录 `id` 带有 `tag`；重复登记不会改变顺序
    pub fn add(&mut self, tag: &str, id: String) {
        let members = self.tags.entry(tag.to_string()).or_default();
        if !members.contains(&id) {
            members.push(id);
        }
    }

    pub fn members(&self, tag: &str) -> &[String] {
        self.tags.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_members(&self, tag: &str) -> bool {
        !self.members(tag).is_empty()
    }

    /// `id` 所带的全部标签
    pub fn tags_of(&self, id: &str) -> Vec<&str> {
        let mut tags: Vec<&str> = self
            .tags
            .iter()
            .filter(|(_, members)| members.iter().any(|member| member == id))
            .map(|(tag, _)| tag.as_str())
            .collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
