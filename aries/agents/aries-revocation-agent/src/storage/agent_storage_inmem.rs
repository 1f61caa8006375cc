use std::{
    collections::HashMap,
    ops::Deref,
    sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use super::AgentStorage;
use crate::error::*;

pub struct AgentStorageInMem<T>
where
    T: Clone,
{
    pub name: String,
    pub store: RwLock<HashMap<String, Mutex<T>>>,
}

impl<T> AgentStorageInMem<T>
where
    T: Clone,
{
    pub fn new(name: &str) -> Self {
        Self {
            store: Default::default(),
            name: name.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_store_read().map(|store| store.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_store_read(&self) -> AgentResult<RwLockReadGuard<'_, HashMap<String, Mutex<T>>>> {
        match self.store.read() {
            Ok(g) => Ok(g),
            Err(e) => {
                error!("Unable to read-lock Object Store: {:?}", e);
                Err(AgentError::from_msg(
                    AgentErrorKind::LockError,
                    &format!("[AgentStorageInMem: {}] Unable to lock Object Store: {:?}", self.name, e),
                ))
            }
        }
    }

    fn lock_store_write(&self) -> AgentResult<RwLockWriteGuard<'_, HashMap<String, Mutex<T>>>> {
        match self.store.write() {
            Ok(g) => Ok(g),
            Err(e) => {
                error!("Unable to write-lock Object Store: {:?}", e);
                Err(AgentError::from_msg(
                    AgentErrorKind::LockError,
                    &format!("[AgentStorageInMem: {}] Unable to lock Object Store: {:?}", self.name, e),
                ))
            }
        }
    }

    fn not_found(&self, id: &str) -> AgentError {
        AgentError::from_msg(
            AgentErrorKind::NotFound,
            &format!("[AgentStorageInMem: {}] Object not found for id: {}", self.name, id),
        )
    }

    fn poisoned(&self) -> AgentError {
        AgentError::from_msg(
            AgentErrorKind::LockError,
            &format!("[AgentStorageInMem: {}] Unable to lock Object Store", self.name),
        )
    }
}

impl<T> AgentStorage<T> for AgentStorageInMem<T>
where
    T: Clone,
{
    type Value = Mutex<T>;

    fn get(&self, id: &str) -> AgentResult<T> {
        let store = self.lock_store_read()?;
        match store.get(id) {
            Some(m) => match m.lock() {
                Ok(obj) => Ok((*obj.deref()).clone()),
                Err(_) => Err(self.poisoned()),
            },
            None => Err(self.not_found(id)),
        }
    }

    fn insert(&self, id: &str, obj: T) -> AgentResult<String> {
        let mut store = self.lock_store_write()?;
        store.insert(id.to_string(), Mutex::new(obj));
        Ok(id.to_string())
    }

    fn contains_key(&self, id: &str) -> bool {
        let store = match self.lock_store_read() {
            Ok(g) => g,
            Err(_) => return false,
        };
        store.contains_key(id)
    }

    fn remove(&self, id: &str) -> AgentResult<T> {
        let mut store = self.lock_store_write()?;
        let entry = store.remove(id).ok_or_else(|| self.not_found(id))?;
        entry.into_inner().map_err(|_| self.poisoned())
    }

    fn find_by<F>(&self, closure: F) -> AgentResult<Vec<String>>
    where
        F: FnMut((&String, &Self::Value)) -> Option<String>,
    {
        let store = self.lock_store_read()?;
        Ok(store.iter().filter_map(closure).collect())
    }

    fn update<F, R>(&self, id: &str, f: F) -> AgentResult<R>
    where
        F: FnOnce(&mut T) -> AgentResult<R>,
    {
        let store = self.lock_store_read()?;
        let entry = store.get(id).ok_or_else(|| self.not_found(id))?;
        let mut obj = entry.lock().map_err(|_| self.poisoned())?;
        f(&mut *obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_and_find() {
        let storage = AgentStorageInMem::new("test");
        storage.insert("a", 1u32).unwrap();
        storage.insert("b", 2u32).unwrap();

        assert_eq!(storage.get("a").unwrap(), 1);
        assert!(storage.contains_key("b"));
        assert_eq!(storage.len(), 2);

        let found = storage
            .find_by(|(id, m)| (*m.lock().unwrap() > 1).then(|| id.clone()))
            .unwrap();
        assert_eq!(found, vec!["b".to_string()]);
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let storage: AgentStorageInMem<u32> = AgentStorageInMem::new("test");
        assert_eq!(storage.get("x").unwrap_err().kind(), AgentErrorKind::NotFound);
        assert_eq!(
            storage.update("x", |_| Ok(())).unwrap_err().kind(),
            AgentErrorKind::NotFound
        );
        assert_eq!(storage.remove("x").unwrap_err().kind(), AgentErrorKind::NotFound);
    }

    #[test]
    fn test_remove_returns_the_object() {
        let storage = AgentStorageInMem::new("test");
        storage.insert("a", 1u32).unwrap();
        assert_eq!(storage.remove("a").unwrap(), 1);
        assert!(!storage.contains_key("a"));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_update_mutates_in_place() {
        let storage = AgentStorageInMem::new("test");
        storage.insert("a", vec![1u32]).unwrap();
        let len = storage
            .update("a", |v| {
                v.push(2);
                Ok(v.len())
            })
            .unwrap();
        assert_eq!(len, 2);
        assert_eq!(storage.get("a").unwrap(), vec![1, 2]);
    }
}
