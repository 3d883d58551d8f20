//! Purpose: Deferred callback records and the name-to-closure lookup table.
//! Exports: `Handler`, `HandlerField`, `HandlerFieldRef`, `Callback`, `CallbackRegistry`.
//! Role: What the handler store persists and how a reloaded record finds its code again.
//! Invariants: A handler stores only a callback *name* plus JSON arguments, never a closure.
//! Invariants: Field access is read-only and limited to the three fixed fields.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    callback: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Map<String, Value>,
}

impl Handler {
    pub fn new(callback: impl Into<String>) -> Self {
        Self {
            callback: callback.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn callback(&self) -> &str {
        &self.callback
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn field(&self, field: HandlerField) -> HandlerFieldRef<'_> {
        match field {
            HandlerField::Callback => HandlerFieldRef::Callback(&self.callback),
            HandlerField::Args => HandlerFieldRef::Args(&self.args),
            HandlerField::Kwargs => HandlerFieldRef::Kwargs(&self.kwargs),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HandlerField {
    Callback,
    Args,
    Kwargs,
}

impl HandlerField {
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerField::Callback => "callback",
            HandlerField::Args => "args",
            HandlerField::Kwargs => "kwargs",
        }
    }
}

impl FromStr for HandlerField {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "callback" => Ok(HandlerField::Callback),
            "args" => Ok(HandlerField::Args),
            "kwargs" => Ok(HandlerField::Kwargs),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown handler field `{other}`"))
                .with_hint("Use one of: callback, args, kwargs.")),
        }
    }
}

impl fmt::Display for HandlerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HandlerFieldRef<'a> {
    Callback(&'a str),
    Args(&'a [Value]),
    Kwargs(&'a Map<String, Value>),
}

impl HandlerFieldRef<'_> {
    pub fn to_value(self) -> Value {
        match self {
            HandlerFieldRef::Callback(name) => Value::String(name.to_string()),
            HandlerFieldRef::Args(args) => Value::Array(args.to_vec()),
            HandlerFieldRef::Kwargs(kwargs) => Value::Object(kwargs.clone()),
        }
    }
}

/// Invoked with the triggering message, then the handler's positional and named arguments.
pub type Callback = Arc<dyn Fn(&Value, &[Value], &Map<String, Value>) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&Value, &[Value], &Map<String, Value>) + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(callback));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Callback> {
        self.callbacks.get(name).cloned()
    }

    pub fn invoke(&self, handler: &Handler, message: &Value) -> Result<(), Error> {
        let Some(callback) = self.callbacks.get(handler.callback()) else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("no callback registered as `{}`", handler.callback()))
                .with_hint("Register the callback name before loading saved handlers."));
        };
        callback(message, handler.args(), handler.kwargs());
        Ok(())
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.callbacks.keys().collect();
        names.sort();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &names)
            .finish()
    }
}
