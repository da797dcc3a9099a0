//! 类型擦除的服务实例

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// 容器产出的共享对象
///
/// 克隆只增加引用计数；两个 `Instance` 是否为同一对象用 [`Instance::ptr_eq`] 判断。
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// 包装一个已有的 `Arc`，不复制对象
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: type_name::<T>(),
        }
    }

    /// 构造时的具体类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// 标签别名解析出的实例列表
    pub fn as_list(&self) -> Option<Arc<Vec<Instance>>> {
        self.downcast::<Vec<Instance>>()
    }

    /// 引用相等（忽略 vtable 元数据）
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("ptr", &Arc::as_ptr(&self.value))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Mailer {
        host: String,
    }

    #[test]
    fn test_downcast_and_type_name() {
        let instance = Instance::new(Mailer {
            host: "smtp".to_string(),
        });
        assert!(instance.is::<Mailer>());
        assert!(instance.type_name().ends_with("Mailer"));
        assert_eq!(instance.downcast::<Mailer>().unwrap().host, "smtp");
        assert!(instance.downcast::<String>().is_none());
    }

    #[test]
    fn test_identity_survives_clone() {
        let first = Instance::new(1u32);
        let second = first.clone();
        let other = Instance::new(1u32);
        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&other));
    }

    #[test]
    fn test_from_arc_shares_allocation() {
        let shared = Arc::new(Mailer {
            host: "relay".to_string(),
        });
        let instance = Instance::from_arc(shared.clone());
        assert!(Arc::ptr_eq(&instance.downcast::<Mailer>().unwrap(), &shared));
    }
}
