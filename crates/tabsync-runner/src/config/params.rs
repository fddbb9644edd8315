use crate::{Error, Result};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::warn;

/// Values supplied for `${name}` placeholders, usually from `-P name=value`.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse `key=value` arguments. Later duplicates win.
    pub fn from_args(args: &[String]) -> Result<Self> {
        args.iter().try_fold(Self::new(), |params, arg| {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            if key.trim().is_empty() {
                return Err(Error::Config(format!("invalid param '{}', empty key", arg)));
            }
            Ok(params.set(key.trim(), value))
        })
    }

    /// Resolve every declared parameter: supplied value, then default.
    ///
    /// A required parameter with neither is an error even if nothing
    /// references it. Supplied values with no declaration are kept, with a
    /// warning, so ad-hoc placeholders still work.
    pub fn resolve(&self, defs: &HashMap<String, ParamDef>) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        let mut missing: Vec<&str> = Vec::new();

        for (name, def) in defs {
            match (self.get(name), &def.default) {
                (Some(v), _) => {
                    resolved.insert(name.clone(), v.to_string());
                }
                (None, Some(d)) => {
                    resolved.insert(name.clone(), d.clone());
                }
                (None, None) if def.required => missing.push(name),
                (None, None) => {
                    resolved.insert(name.clone(), String::new());
                }
            }
        }

        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(Error::Config(format!(
                "missing required parameter(s): {}",
                missing.join(", ")
            )));
        }

        for (name, value) in &self.values {
            if !defs.contains_key(name) {
                warn!("Parameter '{}' is not declared in the scenario", name);
                resolved.insert(name.clone(), value.clone());
            }
        }
        Ok(resolved)
    }
}

/// A parameter declared under `params:`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,

    pub default: Option<String>,

    /// Shown by `--check`.
    pub description: Option<String>,
}

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("placeholder pattern is valid")
    })
}

/// Replace `${name}` with its resolved value. Unknown names stay as written.
pub fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    placeholder().replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
        Some(v) => v.clone(),
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Substitute inside every string of a YAML tree. Mapping keys are left alone.
pub fn substitute_value(value: &mut serde_yaml::Value, values: &BTreeMap<String, String>) {
    match value {
        serde_yaml::Value::String(s) => {
            if s.contains("${") {
                *s = substitute(s, values);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, values);
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, values);
            }
        }
        serde_yaml::Value::Tagged(tagged) => substitute_value(&mut tagged.value, values),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn def(required: bool, default: Option<&str>) -> ParamDef {
        ParamDef {
            required,
            default: default.map(String::from),
            description: None,
        }
    }

    #[test]
    fn test_substitute_multiple() {
        let v = values(&[("user", "standard_user"), ("host", "saucedemo.com")]);
        assert_eq!(
            substitute("https://${host}/?u=${user}&again=${user}", &v),
            "https://saucedemo.com/?u=standard_user&again=standard_user"
        );
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let v = values(&[("a", "1")]);
        assert_eq!(substitute("${a} ${b} ${", &v), "1 ${b} ${");
    }

    #[test]
    fn test_placeholder_names() {
        let names: Vec<_> = placeholder()
            .captures_iter("${site.url} ${user-name} ${_x1} ${1bad} ${}")
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(names, ["site.url", "user-name", "_x1"]);

        let v = values(&[("site.url", "https://shop.test")]);
        assert_eq!(substitute("${site.url}/cart", &v), "https://shop.test/cart");
    }

    #[test]
    fn test_resolve_prefers_supplied_value() {
        let mut defs = HashMap::new();
        defs.insert("user".to_string(), def(true, Some("guest")));
        defs.insert("lang".to_string(), def(false, Some("en")));
        defs.insert("note".to_string(), def(false, None));

        let params = Params::new().set("user", "admin");
        let resolved = params.resolve(&defs).unwrap();
        assert_eq!(resolved["user"], "admin");
        assert_eq!(resolved["lang"], "en");
        assert_eq!(resolved["note"], "");
    }

    #[test]
    fn test_missing_required_listed() {
        let mut defs = HashMap::new();
        defs.insert("password".to_string(), def(true, None));
        defs.insert("user".to_string(), def(true, None));

        let err = Params::new().resolve(&defs).unwrap_err();
        assert_eq!(
            err.to_string(),
            "config error: missing required parameter(s): password, user"
        );
    }

    #[test]
    fn test_undeclared_params_still_substitute() {
        let resolved = Params::new().set("extra", "x").resolve(&HashMap::new()).unwrap();
        assert_eq!(substitute("${extra}", &resolved), "x");
    }

    #[test]
    fn test_from_args() {
        let args = vec!["user=bob".to_string(), "query=a=b".to_string()];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("user"), Some("bob"));
        assert_eq!(params.get("query"), Some("a=b"));

        assert!(Params::from_args(&["novalue".to_string()]).is_err());
        assert!(Params::from_args(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_substitute_value_walks_tree() {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(
            "steps:\n  - goto:\n      url: \"${base}/cart\"\n  - log:\n      message: \"hi ${user}\"\n",
        )
        .unwrap();
        substitute_value(&mut doc, &values(&[("base", "https://x.test"), ("user", "ann")]));
        let text = serde_yaml::to_string(&doc).unwrap();
        assert!(text.contains("https://x.test/cart"), "{text}");
        assert!(text.contains("hi ann"), "{text}");
    }
}
