// RobotRelayService/src/db/memory_store.rs

//! 进程内文档存储。
//!
//! 每个集合是一个以 `id` 排序的 `BTreeMap`。存储生成的 `id` 使用 UUID v7，
//! 按时间有序，因此集合超出容量时淘汰最小的键即淘汰最早写入的日志。

use super::{Store, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Debug)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<String, Value>>,
    max_documents_per_collection: usize,
    available: AtomicBool,
}

impl MemoryStore {
    /// 创建存储实例。
    ///
    /// # 参数
    /// * `max_documents_per_collection` - 单个集合的容量上限，`0` 表示不限制。
    pub fn new(max_documents_per_collection: usize) -> Self {
        Self {
            collections: DashMap::new(),
            max_documents_per_collection,
            available: AtomicBool::new(true),
        }
    }

    /// 模拟存储不可达 (所有操作返回 [`StoreError::Unavailable`])。
    #[cfg(test)]
    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 集合当前的文档数。
    #[cfg(test)]
    pub(crate) fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("内存存储已被标记为不可用".to_string()))
        }
    }

    fn enforce_capacity(&self, docs: &mut BTreeMap<String, Value>, collection: &str) {
        if self.max_documents_per_collection == 0 {
            return;
        }
        while docs.len() > self.max_documents_per_collection {
            if let Some((evicted, _)) = docs.pop_first() {
                debug!("[MemoryStore] 集合 {} 超出容量，淘汰文档 {}", collection, evicted);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.check_available()?;
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn find_where(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>, StoreError> {
        self.check_available()?;
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        self.check_available()?;
        let Value::Object(mut fields) = document else {
            return Err(StoreError::InvalidDocument(format!(
                "集合 {} 只接受 JSON 对象",
                collection
            )));
        };
        let id = match fields.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(StoreError::InvalidDocument(format!("id 字段必须是字符串: {}", other)));
            }
            None => {
                let id = Uuid::now_v7().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.insert(id.clone(), Value::Object(fields)).is_some() {
            warn!("[MemoryStore] 集合 {} 中的文档 {} 被覆盖", collection, id);
        }
        self.enforce_capacity(&mut docs, collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        upsert: bool,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(Value::Object(existing)) => {
                for (key, value) in patch {
                    existing.insert(key, value);
                }
                Ok(true)
            }
            Some(_) => Err(StoreError::InvalidDocument(format!(
                "集合 {} 中的文档 {} 不是 JSON 对象",
                collection, id
            ))),
            None if upsert => {
                let mut fields = patch;
                fields.insert("id".to_string(), Value::String(id.to_string()));
                docs.insert(id.to_string(), Value::Object(fields));
                self.enforce_capacity(&mut docs, collection);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
