//! `JSON.stringify` for the heap, built on `serde_json` (insertion order kept).

use serde_json::{Map, Number};

use super::Heap;
use crate::engine::{EngineResult, ObjectRef, ScriptEngine, Value};

impl Heap {
    pub(super) fn stringify(&mut self, value: &Value) -> EngineResult<Option<String>> {
        let mut stack = Vec::new();
        let json = self.to_json(value.clone(), "", &mut stack)?;
        Ok(json.map(|json| json.to_string()))
    }

    fn to_json(
        &mut self,
        value: Value,
        key: &str,
        stack: &mut Vec<ObjectRef>,
    ) -> EngineResult<Option<serde_json::Value>> {
        let value = match value.as_object() {
            Some(object) => {
                let to_json = self.get(object, "toJSON")?;
                if self.is_callable(&to_json) {
                    self.call(&to_json, value, &[key.into()])?
                } else {
                    value
                }
            }
            None => value,
        };

        let object = match value {
            Value::Undefined => return Ok(None),
            Value::Null => return Ok(Some(serde_json::Value::Null)),
            Value::Bool(b) => return Ok(Some(serde_json::Value::Bool(b))),
            Value::Number(n) => return Ok(Some(number_to_json(n))),
            Value::String(s) => return Ok(Some(serde_json::Value::String(s))),
            Value::Object(object) => object,
        };

        if self.is_callable(&Value::Object(object)) {
            return Ok(None);
        }

        if stack.contains(&object) {
            return Err(self.type_error("Converting circular structure to JSON"));
        }
        if stack.len() >= self.max_json_depth {
            return Err(self.new_error("RangeError", "Maximum call stack size exceeded"));
        }

        stack.push(object);
        let result = if self.is_array(&Value::Object(object)) {
            self.array_to_json(object, stack)
        } else {
            self.object_to_json(object, stack)
        };
        stack.pop();

        result.map(Some)
    }

    fn array_to_json(&mut self, array: ObjectRef, stack: &mut Vec<ObjectRef>) -> EngineResult<serde_json::Value> {
        let length = self.array_length(array)?;
        let mut items = Vec::with_capacity(length);

        for index in 0..length {
            let key = index.to_string();
            let element = self.get(array, &key)?;
            items.push(self.to_json(element, &key, stack)?.unwrap_or(serde_json::Value::Null));
        }

        Ok(serde_json::Value::Array(items))
    }

    fn object_to_json(&mut self, object: ObjectRef, stack: &mut Vec<ObjectRef>) -> EngineResult<serde_json::Value> {
        let mut map = Map::new();

        for key in self.enumerable_keys(object, true)? {
            let property = self.get(object, &key)?;
            if let Some(json) = self.to_json(property, &key, stack)? {
                map.insert(key, json);
            }
        }

        Ok(serde_json::Value::Object(map))
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return serde_json::Value::Number(Number::from(n as i64));
    }

    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
