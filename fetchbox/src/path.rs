//! `{name}` placeholder substitution.

use fetchbox_core::Params;
use serde_json::Value;
use tracing::warn;

/// Substitutes each named placeholder of `template`.
///
/// Values are looked up in `params` first, then in `data`. A value that is
/// present and not `null` is removed from its map and written into the URL;
/// removal goes through copy-on-write so maps shared with the caller stay
/// untouched. A placeholder without a value becomes the empty string.
pub(crate) fn substitute_path(
    template: &str,
    names: &[String],
    params: &mut Option<Params>,
    data: &mut Option<Params>,
) -> String {
    let mut url = template.to_owned();
    for name in names {
        let value = take(params, name).or_else(|| take(data, name));
        let text = match &value {
            Some(value) => render(value),
            None => {
                warn!(
                    %template,
                    placeholder = %name,
                    "no value for path placeholder, substituting empty string"
                );
                String::new()
            }
        };
        url = url.replacen(&format!("{{{name}}}"), &text, 1);
    }
    url
}

fn take(source: &mut Option<Params>, name: &str) -> Option<Value> {
    let params = source.as_mut()?;
    if params.get(name).is_none_or(Value::is_null) {
        return None;
    }
    params.remove(name)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
