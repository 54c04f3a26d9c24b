use concord_core::{ConceptError, Dict};
use serde_json::Value;

pub(crate) fn string<'a>(input: &'a Dict, name: &str) -> Result<&'a str, ConceptError> {
    match input.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ConceptError::InvalidArgument {
            name: name.to_string(),
            expected: "a string",
        }),
        None => Err(ConceptError::MissingArgument(name.to_string())),
    }
}

/// Like `string`, but an absent field is `None`.
pub(crate) fn optional_string<'a>(
    input: &'a Dict,
    name: &str,
) -> Result<Option<&'a str>, ConceptError> {
    match input.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => string(input, name).map(Some),
    }
}

/// Non-empty, trimmed string argument.
pub(crate) fn name<'a>(input: &'a Dict, name: &str) -> Result<&'a str, ConceptError> {
    let value = string(input, name)?.trim();
    if value.is_empty() {
        return Err(ConceptError::InvalidArgument {
            name: name.to_string(),
            expected: "a non-empty string",
        });
    }
    Ok(value)
}
