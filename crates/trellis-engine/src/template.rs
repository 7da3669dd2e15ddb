//! Prompt template substitution.
//!
//! Rewrites `{{name}}` placeholders from the resolved input map, plus a
//! compatibility pass for `{{name.text}}`: legacy prompts reference an
//! upstream node's display name with a `.text` suffix while the wiring
//! always stores outputs under `.output`.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

/// Replace every resolvable placeholder in `template` with the string form
/// of the corresponding input value. Pure function; unresolvable
/// placeholders are left untouched.
pub fn substitute(template: &str, inputs: &HashMap<String, Value>) -> String {
    let mut text = template.to_string();

    for (key, value) in inputs {
        let placeholder = format!("{{{{{}}}}}", key);
        if text.contains(&placeholder) {
            text = text.replace(&placeholder, &display_value(value));
        }
    }

    let text_var = Regex::new(r"\{\{([^}]+)\.text\}\}").unwrap();
    let names: Vec<String> = text_var
        .captures_iter(&text)
        .map(|c| c[1].to_string())
        .collect();
    for name in names {
        if let Some(value) = inputs.get(&format!("{}.output", name)) {
            let placeholder = format!("{{{{{}.text}}}}", name);
            text = text.replace(&placeholder, &display_value(value));
        }
    }

    text
}

/// JSON strings render bare; everything else via its JSON form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_basic_substitution() {
        let result = substitute(
            "Summarize: {{input}}",
            &inputs(&[("input", serde_json::json!("the article"))]),
        );
        assert_eq!(result, "Summarize: the article");
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let result = substitute(
            "count={{n}} flag={{f}}",
            &inputs(&[("n", serde_json::json!(3)), ("f", serde_json::json!(true))]),
        );
        assert_eq!(result, "count=3 flag=true");
    }

    #[test]
    fn test_unresolvable_placeholder_left_untouched() {
        let result = substitute("Hello {{missing}}", &HashMap::new());
        assert_eq!(result, "Hello {{missing}}");
    }

    #[test]
    fn test_text_suffix_compatibility_pass() {
        let result = substitute(
            "Context: {{Research.text}}",
            &inputs(&[("Research.output", serde_json::json!("findings"))]),
        );
        assert_eq!(result, "Context: findings");
    }

    #[test]
    fn test_text_suffix_without_output_key_left_untouched() {
        let result = substitute(
            "Context: {{Research.text}}",
            &inputs(&[("Other.output", serde_json::json!("x"))]),
        );
        assert_eq!(result, "Context: {{Research.text}}");
    }

    #[test]
    fn test_idempotent_once_resolved() {
        let map = inputs(&[
            ("input", serde_json::json!("A")),
            ("Research.output", serde_json::json!("B")),
        ]);
        let once = substitute("{{input}} + {{Research.text}}", &map);
        let twice = substitute(&once, &map);
        assert_eq!(once, twice);
        assert_eq!(once, "A + B");
    }

    #[test]
    fn test_repeated_placeholder_replaced_everywhere() {
        let result = substitute(
            "{{input}} and {{input}}",
            &inputs(&[("input", serde_json::json!("x"))]),
        );
        assert_eq!(result, "x and x");
    }
}
