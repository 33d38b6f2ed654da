//! Older handler API names kept for behaviors written against them.
//!
//! Each method forwards to its current [`HandlerApi`] counterpart.

use serde_json::Value;

use crate::context::HandlerApi;
use crate::error::ScriptResult;

pub trait LegacyHandlerApi {
    /// Same as [`HandlerApi::memory`], but returns a copy
    fn get_var(&self, key: &str) -> Option<Value>;

    /// Same as [`HandlerApi::set_memory`]
    fn set_var(&mut self, key: &str, value: Value) -> ScriptResult<()>;

    /// Same as [`HandlerApi::send_self_message`]
    fn send_message_to_self(&mut self, name: &str, data: Value) -> ScriptResult<()>;

    /// Same as [`HandlerApi::does_actor_exist`]
    fn exists(&self, name: &str) -> bool;

    /// Same as [`HandlerApi::distance_between`]
    fn get_distance(&self, a: &str, b: &str) -> ScriptResult<f64>;
}

impl LegacyHandlerApi for HandlerApi<'_> {
    fn get_var(&self, key: &str) -> Option<Value> {
        self.memory(key).cloned()
    }

    fn set_var(&mut self, key: &str, value: Value) -> ScriptResult<()> {
        self.set_memory(key, &value)
    }

    fn send_message_to_self(&mut self, name: &str, data: Value) -> ScriptResult<()> {
        self.send_self_message(name, data)
    }

    fn exists(&self, name: &str) -> bool {
        self.does_actor_exist(name)
    }

    fn get_distance(&self, a: &str, b: &str) -> ScriptResult<f64> {
        self.distance_between(a, b)
    }
}
