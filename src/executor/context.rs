use crate::core::Value;
use crate::storage::InMemoryStorage;

pub struct ExecutionContext<'a> {
    pub storage: &'a mut InMemoryStorage,
    pub params: &'a [Value],
}

impl<'a> ExecutionContext<'a> {
    pub fn new(storage: &'a mut InMemoryStorage, params: &'a [Value]) -> Self {
        Self { storage, params }
    }
}
