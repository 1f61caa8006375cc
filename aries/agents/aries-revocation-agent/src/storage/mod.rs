pub(crate) mod agent_storage_inmem;

use crate::error::AgentResult;

pub trait AgentStorage<T>
where
    T: Clone,
{
    type Value;

    fn get(&self, id: &str) -> AgentResult<T>;
    fn insert(&self, id: &str, obj: T) -> AgentResult<String>;
    fn contains_key(&self, id: &str) -> bool;
    fn remove(&self, id: &str) -> AgentResult<T>;
    fn find_by<F>(&self, closure: F) -> AgentResult<Vec<String>>
    where
        F: FnMut((&String, &Self::Value)) -> Option<String>;
    /// Applies `f` to the stored object in place, holding its lock for the duration of the call.
    fn update<F, R>(&self, id: &str, f: F) -> AgentResult<R>
    where
        F: FnOnce(&mut T) -> AgentResult<R>;
}
