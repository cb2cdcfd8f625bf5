//! Placeholder parameter resolution.
//!
//! Handlers and background tasks carry templated configuration containing
//! `${name}` or `${namespace.name}` placeholders. A resolver turns a placeholder
//! name into its value by consulting the process-wide [`ParamStore`] first and
//! then, when bound to a request, that request's query parameters.
//!
//! Resolution never fails: an unknown name resolves to the empty string.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::env;

/// Placeholder grammar recognised by [`substitute`]: `${ident}` or `${ident.ident}`.
static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}")
        .expect("placeholder regex should be valid")
});

/// Names eligible for lookup in request query parameters.
static PARAM_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]+$").expect("param name regex should be valid")
});

/// Namespace prefix that maps placeholders onto environment variables.
pub const ENV_NAMESPACE: &str = "_env.";

/// Read-only key-value provider consulted before request parameters.
///
/// Constructed once at startup and injected into the server, so tests can
/// substitute their own store.
pub trait ParamStore: Send + Sync {
    /// Look up `name`; `None` when the store has no such entry.
    fn get(&self, name: &str) -> Option<String>;
}

/// Default store: the configured `params` table plus `_env.<NAME>` lookups.
#[derive(Debug, Clone, Default)]
pub struct GlobalParams {
    values: HashMap<String, String>,
}

impl GlobalParams {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl ParamStore for GlobalParams {
    fn get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.values.get(name) {
            return Some(v.clone());
        }
        name.strip_prefix(ENV_NAMESPACE)
            .and_then(|var| env::var(var).ok())
    }
}

impl ParamStore for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Build a resolver bound to one request's query parameters.
///
/// Lookup order:
/// 1. the global store, by exact name (a hit short-circuits);
/// 2. when `query` is present and `name` is a plain identifier of at least
///    two characters, the first query value for `name`, or empty.
///
/// Anything else resolves to the empty string. Passing `None` for `query`
/// gives the global-only resolver used outside any request.
pub fn request_params<'a>(
    store: &'a dyn ParamStore,
    query: Option<&'a HashMap<String, String>>,
) -> impl Fn(&str) -> String + 'a {
    move |name: &str| {
        if let Some(v) = store.get(name) {
            return v;
        }
        match query {
            Some(q) if PARAM_NAME_RE.is_match(name) => q.get(name).cloned().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Global-only resolver for configuration outside any request.
pub fn global_params(store: &dyn ParamStore) -> impl Fn(&str) -> String + '_ {
    request_params(store, None)
}

/// Replace every `${name}` placeholder in `text` with `resolve(name)`.
pub fn substitute<F>(text: &str, resolve: F) -> String
where
    F: Fn(&str) -> String,
{
    PARAM_RE
        .replace_all(text, |caps: &Captures| resolve(&caps[1]))
        .into_owned()
}

/// Prefix of the shell variables produced by [`bind_shell_params`].
pub const SHELL_PARAM_PREFIX: &str = "SERVANT_PARAM_";

/// Prepare shell code for `sh -c` without splicing values into it.
///
/// Every `${name}` placeholder becomes a reference to a shell variable
/// (`${SERVANT_PARAM_<n>}`), and the resolved values are returned as the
/// environment to run the code with. The shell expands a variable's value
/// without parsing it again, so `$(...)`, `;` and quotes coming from a query
/// string stay literal text. A name used twice shares one variable.
pub fn bind_shell_params<F>(code: &str, resolve: F) -> (String, Vec<(String, String)>)
where
    F: Fn(&str) -> String,
{
    let mut names: Vec<String> = Vec::new();
    let mut vars: Vec<(String, String)> = Vec::new();
    let bound = PARAM_RE
        .replace_all(code, |caps: &Captures| {
            let name = &caps[1];
            let index = match names.iter().position(|n| n == name) {
                Some(index) => index,
                None => {
                    names.push(name.to_string());
                    vars.push((format!("{SHELL_PARAM_PREFIX}{}", vars.len()), resolve(name)));
                    vars.len() - 1
                }
            };
            format!("${{{}}}", vars[index].0)
        })
        .into_owned();
    (bound, vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GlobalParams {
        let mut values = HashMap::new();
        values.insert("root".to_string(), "/srv".to_string());
        values.insert("name".to_string(), "global".to_string());
        GlobalParams::new(values)
    }

    fn query() -> HashMap<String, String> {
        let mut q = HashMap::new();
        q.insert("name".to_string(), "from-query".to_string());
        q.insert("service".to_string(), "nginx".to_string());
        q.insert("x".to_string(), "short".to_string());
        q
    }

    #[test]
    fn test_global_store_takes_precedence_over_query() {
        let s = store();
        let q = query();
        let resolve = request_params(&s, Some(&q));
        assert_eq!(resolve("name"), "global");
        assert_eq!(resolve("root"), "/srv");
    }

    #[test]
    fn test_query_used_when_absent_from_store() {
        let s = store();
        let q = query();
        let resolve = request_params(&s, Some(&q));
        assert_eq!(resolve("service"), "nginx");
        assert_eq!(resolve("missing"), "");
    }

    #[test]
    fn test_query_lookup_requires_identifier_of_two_or_more_chars() {
        let s = store();
        let q = query();
        let resolve = request_params(&s, Some(&q));
        // single character names are not query-eligible
        assert_eq!(resolve("x"), "");
        assert_eq!(resolve("_service"), "");
        assert_eq!(resolve("a.b"), "");
    }

    #[test]
    fn test_without_request_only_global_store_is_consulted() {
        let s = store();
        let resolve = global_params(&s);
        assert_eq!(resolve("root"), "/srv");
        assert_eq!(resolve("service"), "");
    }

    #[test]
    fn test_env_namespace() {
        let s = store();
        let resolve = global_params(&s);
        let path = env::var("PATH").unwrap_or_default();
        assert_eq!(resolve("_env.PATH"), path);
        assert_eq!(resolve("_env.SERVANT_SURELY_UNSET_VARIABLE"), "");
    }

    #[test]
    fn test_substitute_placeholders() {
        let s = store();
        let q = query();
        let resolve = request_params(&s, Some(&q));
        let out = substitute("systemctl restart ${service} --root=${root} ${nope} $plain", resolve);
        assert_eq!(out, "systemctl restart nginx --root=/srv  $plain");
    }

    #[test]
    fn test_substitute_dotted_names() {
        let mut values = HashMap::new();
        values.insert("db.host".to_string(), "localhost".to_string());
        let resolve = global_params(&values);
        assert_eq!(substitute("host=${db.host}", resolve), "host=localhost");
    }

    #[test]
    fn test_bind_shell_params_keeps_values_out_of_code() {
        let q = query();
        let mut hostile = q.clone();
        hostile.insert("service".to_string(), "x; rm -rf /".to_string());
        let s = store();
        let resolve = request_params(&s, Some(&hostile));
        let (code, vars) = bind_shell_params("restart ${service} in ${root}, again ${service}", resolve);
        assert_eq!(code, "restart ${SERVANT_PARAM_0} in ${SERVANT_PARAM_1}, again ${SERVANT_PARAM_0}");
        assert_eq!(
            vars,
            vec![
                ("SERVANT_PARAM_0".to_string(), "x; rm -rf /".to_string()),
                ("SERVANT_PARAM_1".to_string(), "/srv".to_string()),
            ]
        );
    }
}
