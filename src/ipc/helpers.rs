use crate::ipc::error::err;
use serde_json::Value;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn get_string_list(params: &Value, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = params.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Some(items) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain strings", key)))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
