//! Host-side access to an entity's script object.
//!
//! Every operation resolves the script object first (creating it if needed),
//! runs inside the engine's exception trap, and forwards a caught exception
//! as [`BridgeError::Engine`]. Enumerations either complete or fail as a
//! whole; no partial result is ever returned.

use std::collections::HashMap;

use crate::bridge::Bridge;
use crate::engine::{EngineResult, ObjectRef, ScriptEngine, Value};
use crate::entity::HostEntity;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::HostValue;

impl<E: ScriptEngine + 'static> Bridge<E> {
    pub fn proxy(&mut self, entity: &HostEntity) -> ObjectProxy<'_, E> {
        ObjectProxy {
            bridge: self,
            entity: entity.clone(),
        }
    }
}

/// Field, method and enumeration access on one entity.
pub struct ObjectProxy<'a, E: ScriptEngine + 'static> {
    bridge: &'a mut Bridge<E>,
    entity: HostEntity,
}

impl<E: ScriptEngine + 'static> ObjectProxy<'_, E> {
    pub fn entity(&self) -> &HostEntity {
        &self.entity
    }

    fn object(&mut self) -> BridgeResult<ObjectRef> {
        self.bridge.get_script_object(&self.entity)
    }

    fn trap<T>(&mut self, result: EngineResult<T>) -> BridgeResult<T> {
        result.map_err(|thrown| self.bridge.exception(thrown))
    }

    pub fn get_field(&mut self, name: &str) -> BridgeResult<HostValue> {
        let object = self.object()?;
        let value = self.bridge.engine.get(object, name);
        let value = self.trap(value)?;
        self.bridge.to_host(&value)
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        let object = self.object()?;
        let value = self.bridge.to_script(&value.into())?;
        let result = self.bridge.engine.set(object, name, value);
        self.trap(result)
    }

    /// `own_only` ignores properties inherited through the prototype chain.
    pub fn has_field(&mut self, name: &str, own_only: bool) -> BridgeResult<bool> {
        let object = self.object()?;
        let result = if own_only {
            self.bridge.engine.has_own(object, name)
        } else {
            self.bridge.engine.has(object, name)
        };
        self.trap(result)
    }

    /// Call the method stored under `name` with the script object as receiver.
    ///
    /// A non-callable field is an illegal argument; nothing is called.
    pub fn call_method(&mut self, name: &str, args: &[HostValue]) -> BridgeResult<HostValue> {
        let object = self.object()?;
        let function = self.bridge.engine.get(object, name);
        let function = self.trap(function)?;

        if !self.bridge.engine.is_callable(&function) {
            return Err(BridgeError::IllegalArgument(format!(
                "Called field '{}' is not a function",
                name
            )));
        }

        let mut argv = Vec::new();
        if !args.is_empty() {
            argv.reserve_exact(args.len());
            for arg in args {
                argv.push(self.bridge.to_script(arg)?);
            }
        }

        let result = self.bridge.engine.call(&function, Value::Object(object), &argv);
        let result = self.trap(result)?;
        self.bridge.to_host(&result)
    }

    /// Enumerable property names, own only or including inherited ones.
    pub fn get_keys(&mut self, own_only: bool) -> BridgeResult<Vec<String>> {
        let object = self.object()?;
        let names = self.bridge.engine.property_names(object, own_only);
        let names = self.trap(names)?;
        let length = self.bridge.engine.array_length(names);
        let length = self.trap(length)?;

        let mut keys = Vec::with_capacity(length);
        for index in 0..length {
            let name = self.bridge.engine.get(names, &index.to_string());
            let key = match self.trap(name)? {
                Value::String(key) => key,
                other => {
                    let rendered = self.bridge.engine.to_display_string(&other);
                    self.trap(rendered)?
                }
            };
            keys.push(key);
        }

        Ok(keys)
    }

    /// Name to value mapping of the enumerable properties.
    pub fn get_fields(&mut self, own_only: bool) -> BridgeResult<HashMap<String, HostValue>> {
        let object = self.object()?;
        let keys = self.get_keys(own_only)?;

        let mut fields = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = self.bridge.engine.get(object, &key);
            let value = self.trap(value)?;
            let value = self.bridge.to_host(&value)?;
            fields.insert(key, value);
        }

        Ok(fields)
    }

    /// Default string conversion of the script object.
    pub fn to_display_string(&mut self) -> BridgeResult<String> {
        let object = self.object()?;
        let result = self.bridge.engine.to_display_string(&Value::Object(object));
        self.trap(result)
    }

    /// JSON serialization; `None` when the object has no JSON representation.
    pub fn to_json_string(&mut self) -> BridgeResult<Option<String>> {
        let object = self.object()?;
        let result = self.bridge.engine.json_stringify(&Value::Object(object));
        self.trap(result)
    }
}
