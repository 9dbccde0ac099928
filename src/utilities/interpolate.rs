//! `{key}` placeholder interpolation used by agents, tasks, and output
//! file paths. Keys with no matching input are left untouched.

use std::collections::HashMap;

/// Replace every `{key}` in `template` with the matching value.
pub fn interpolate(template: &str, inputs: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in inputs {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_known_keys_and_keeps_unknown_ones() {
        let mut inputs = HashMap::new();
        inputs.insert("topic".to_string(), "Rust".to_string());

        assert_eq!(
            interpolate("Draft an intro about {topic}", &inputs),
            "Draft an intro about Rust"
        );
        assert_eq!(
            interpolate("{topic} and {missing}", &inputs),
            "Rust and {missing}"
        );
        assert_eq!(interpolate("no placeholders", &inputs), "no placeholders");
    }
}
