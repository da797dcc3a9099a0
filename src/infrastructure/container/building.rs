//! 构建中标识符集合（循环引用检测）与按标识符的构建锁

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::thread::{self, ThreadId};

/// 每个线程一条构建链；只在一次 `get` 调用树内有内容
#[derive(Default)]
pub(crate) struct BuildingSet {
    stacks: DashMap<ThreadId, Vec<String>>,
}

impl BuildingSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 标记 `id` 正在构建
    ///
    /// 已在当前线程的构建链上时返回 `Err(chain)`，链以重复进入的 `id` 结尾。
    pub(crate) fn enter(&self, id: &str) -> Result<BuildGuard<'_>, Vec<String>> {
        let thread = thread::current().id();
        let mut stack = self.stacks.entry(thread).or_default();
        if stack.iter().any(|building| building == id) {
            let mut chain = stack.value().clone();
            chain.push(id.to_string());
            return Err(chain);
        }
        stack.push(id.to_string());
        Ok(BuildGuard {
            set: self,
            thread,
            id: id.to_string(),
        })
    }

    pub(crate) fn is_building(&self, id: &str) -> bool {
        self.stacks
            .get(&thread::current().id())
            .is_some_and(|stack| stack.iter().any(|building| building == id))
    }

    /// 当前线程的构建链
    pub(crate) fn chain(&self) -> Vec<String> {
        self.stacks
            .get(&thread::current().id())
            .map(|stack| stack.value().clone())
            .unwrap_or_default()
    }

    fn leave(&self, thread: ThreadId, id: &str) {
        let now_empty = match self.stacks.get_mut(&thread) {
            Some(mut stack) => {
                if let Some(pos) = stack.iter().rposition(|building| building == id) {
                    stack.remove(pos);
                }
                stack.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.stacks.remove_if(&thread, |_, stack| stack.is_empty());
        }
    }
}

/// 离开作用域（包括 `?` 提前返回和 panic 展开）时取消标记
pub(crate) struct BuildGuard<'a> {
    set: &'a BuildingSet,
    thread: ThreadId,
    id: String,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.set.leave(self.thread, &self.id);
    }
}

/// 跨线程的按标识符构建锁
///
/// 同一标识符同一时刻只有一个线程在构建。等待关系成环时 `acquire` 返回环上的
/// 标识符，不会阻塞。
#[derive(Default)]
pub(crate) struct BuildLocks {
    table: Mutex<LockTable>,
    released: Condvar,
}

#[derive(Default)]
struct LockTable {
    owners: HashMap<String, ThreadId>,
    waiting: HashMap<ThreadId, String>,
}

impl LockTable {
    /// 从 `id` 出发沿“持有者正在等待的标识符”前进，回到 `me` 持有的锁时返回经过的标识符
    fn cycle_from(&self, id: &str, me: ThreadId) -> Option<Vec<String>> {
        let mut walked = vec![id.to_string()];
        let mut current = id;
        loop {
            let owner = *self.owners.get(current)?;
            if owner == me {
                return Some(walked);
            }
            let next = self.waiting.get(&owner)?;
            if walked.iter().any(|seen| seen == next) {
                return None;
            }
            walked.push(next.clone());
            current = next.as_str();
        }
    }
}

impl BuildLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 获取 `id` 的构建锁，被其他线程持有时等待
    ///
    /// 等待会形成环时返回 `Err(walked)`，最后一个元素是当前线程已持有的标识符。
    pub(crate) fn acquire(&self, id: &str) -> Result<BuildLock<'_>, Vec<String>> {
        let me = thread::current().id();
        let mut table = self.table.lock();
        loop {
            let owner = table.owners.get(id).copied();
            match owner {
                None => {
                    table.waiting.remove(&me);
                    table.owners.insert(id.to_string(), me);
                    return Ok(BuildLock {
                        locks: self,
                        id: id.to_string(),
                    });
                }
                Some(owner) if owner == me => {
                    table.waiting.remove(&me);
                    return Err(vec![id.to_string()]);
                }
                Some(_) => {
                    if let Some(walked) = table.cycle_from(id, me) {
                        table.waiting.remove(&me);
                        return Err(walked);
                    }
                    table.waiting.insert(me, id.to_string());
                    self.released.wait(&mut table);
                }
            }
        }
    }

    fn release(&self, id: &str) {
        self.table.lock().owners.remove(id);
        self.released.notify_all();
    }
}

/// 持有期间其他线程无法构建同一标识符
pub(crate) struct BuildLock<'a> {
    locks: &'a BuildLocks,
    id: String,
}

impl Drop for BuildLock<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.id);
    }
}
