//! Conversion between host values and script values.

use crate::bridge::Bridge;
use crate::engine::{ObjectRef, ScriptEngine, Value};
use crate::entity::HostEntity;
use crate::error::{BridgeError, BridgeResult};

/// A value on the host side of the boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<HostValue>),
    Entity(HostEntity),
}

impl HostValue {
    pub fn is_nullish(&self) -> bool {
        matches!(self, HostValue::Undefined | HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&HostEntity> {
        match self {
            HostValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(value as f64)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<HostEntity> for HostValue {
    fn from(value: HostEntity) -> Self {
        HostValue::Entity(value)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(value: Vec<HostValue>) -> Self {
        HostValue::Array(value)
    }
}

impl<E: ScriptEngine + 'static> Bridge<E> {
    /// Convert a host value for use on the script side.
    ///
    /// Entities resolve to their script object, created on demand.
    pub fn to_script(&mut self, value: &HostValue) -> BridgeResult<Value> {
        self.to_script_at(value, 0)
    }

    fn to_script_at(&mut self, value: &HostValue, depth: usize) -> BridgeResult<Value> {
        Ok(match value {
            HostValue::Undefined => Value::Undefined,
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => Value::Number(*n),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::Entity(entity) => Value::Object(self.get_script_object(entity)?),
            HostValue::Array(items) => {
                self.check_depth(depth)?;

                let elements = items
                    .iter()
                    .map(|item| self.to_script_at(item, depth + 1))
                    .collect::<BridgeResult<Vec<_>>>()?;
                Value::Object(self.engine.new_array(elements))
            }
        })
    }

    /// Convert a script value for the host side.
    ///
    /// Linked objects come back as their entity. Other objects are wrapped in
    /// a new entity of the registry's generic class.
    pub fn to_host(&mut self, value: &Value) -> BridgeResult<HostValue> {
        self.to_host_at(value, 0)
    }

    fn to_host_at(&mut self, value: &Value, depth: usize) -> BridgeResult<HostValue> {
        let object = match value {
            Value::Undefined => return Ok(HostValue::Undefined),
            Value::Null => return Ok(HostValue::Null),
            Value::Bool(b) => return Ok(HostValue::Bool(*b)),
            Value::Number(n) => return Ok(HostValue::Number(*n)),
            Value::String(s) => return Ok(HostValue::String(s.clone())),
            Value::Object(object) => *object,
        };

        if self.engine.is_array(value) {
            return self.array_to_host(object, depth);
        }

        if let Some(id) = self.engine.internal_slot(object) {
            return self
                .entity_by_id(id)
                .map(HostValue::Entity)
                .ok_or_else(|| BridgeError::Unmarshalable(format!("object linked to destroyed entity {}", id)));
        }

        let Some(class) = self.registry().generic_class().cloned() else {
            return Err(BridgeError::Unmarshalable(
                "script object has no entity and no generic class is registered".to_string(),
            ));
        };

        let entity = self.create_entity(&class)?;
        self.attach_script_object(&entity, object);
        Ok(HostValue::Entity(entity))
    }

    fn array_to_host(&mut self, array: ObjectRef, depth: usize) -> BridgeResult<HostValue> {
        self.check_depth(depth)?;

        let length = self.engine.array_length(array).map_err(|thrown| self.exception(thrown))?;
        let mut items = Vec::with_capacity(length);

        for index in 0..length {
            let element = self
                .engine
                .get(array, &index.to_string())
                .map_err(|thrown| self.exception(thrown))?;
            items.push(self.to_host_at(&element, depth + 1)?);
        }

        Ok(HostValue::Array(items))
    }

    fn check_depth(&self, depth: usize) -> BridgeResult<()> {
        let max = self.config().max_marshal_depth;
        if depth >= max {
            return Err(BridgeError::MarshalDepth(max));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BridgeConfig;
    use crate::engine::Heap;
    use crate::entity::HandleMode;
    use crate::registry::{ObjectKind, StaticRegistry, plain_object};

    fn bridge(config: BridgeConfig) -> Bridge<Heap> {
        let registry = StaticRegistry::<Heap>::builder()
            .register("test.Generic", ObjectKind::Ordinary, plain_object)
            .generic("test.Generic")
            .build()
            .unwrap();
        Bridge::with_config(Heap::new(), Arc::new(registry), config)
    }

    #[test]
    fn test_primitives_and_arrays() {
        let mut bridge = bridge(BridgeConfig::default());
        let host = HostValue::Array(vec![1.into(), "two".into(), HostValue::Null, true.into()]);

        let script = bridge.to_script(&host).unwrap();
        assert!(bridge.engine().is_array(&script));
        assert_eq!(bridge.to_host(&script).unwrap(), host);
    }

    #[test]
    fn test_entity_round_trips_to_same_entity() {
        let mut bridge = bridge(BridgeConfig::default());
        let entity = bridge.create_entity(&"test.Generic".into()).unwrap();

        let script = bridge.to_script(&entity.clone().into()).unwrap();
        let back = bridge.to_host(&script).unwrap();
        assert_eq!(back.as_entity(), Some(&entity));
    }

    #[test]
    fn test_unlinked_object_is_wrapped() {
        let mut bridge = bridge(BridgeConfig::default());
        let object = bridge.engine_mut().new_object();

        let host = bridge.to_host(&Value::Object(object)).unwrap();
        let entity = host.as_entity().unwrap().clone();
        assert_eq!(entity.class().canonical(), "test.Generic");
        assert_eq!(entity.handle_mode(), HandleMode::Weak);
        assert_eq!(bridge.entity_for(object), Some(entity));
    }

    #[test]
    fn test_depth_limit() {
        let mut bridge = bridge(BridgeConfig::default().with_max_marshal_depth(2));
        let deep = HostValue::Array(vec![HostValue::Array(vec![HostValue::Array(vec![])])]);

        let err = bridge.to_script(&deep).unwrap_err();
        assert!(matches!(err, BridgeError::MarshalDepth(2)));
    }
}
