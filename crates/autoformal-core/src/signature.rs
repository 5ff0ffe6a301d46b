//! Function signatures and the Python to Lean type bridge.
//!
//! Signatures are extracted from solved Python source with a small regex
//! scanner. Unannotated parameters fall back to types inferred from test
//! assertions, then to `Int`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::SignatureError;

/// One named, typed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub lean_type: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, lean_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lean_type: lean_type.into(),
        }
    }
}

/// Name, ordered parameters and return type of the function being formalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
}

fn def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?ms)^[ \t]*def[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\((.*?)\)[ \t]*(?:->[ \t]*([^:\n]+?))?[ \t]*:")
            .expect("def pattern is valid")
    })
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            return_type: return_type.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SignatureError> {
        if self.name.trim().is_empty() {
            return Err(SignatureError::EmptyField {
                field: "name".to_string(),
            });
        }
        if self.return_type.trim().is_empty() {
            return Err(SignatureError::EmptyField {
                field: "return_type".to_string(),
            });
        }
        for param in &self.parameters {
            if param.name.trim().is_empty() || param.lean_type.trim().is_empty() {
                return Err(SignatureError::MalformedParameters {
                    detail: format!("parameter `{}: {}`", param.name, param.lean_type),
                });
            }
        }
        Ok(())
    }

    /// Extract the signature of `preferred_name`, or of the first function
    /// defined in `source` when no name is given.
    pub fn from_python_source(
        source: &str,
        preferred_name: Option<&str>,
    ) -> Result<Self, SignatureError> {
        Self::from_python_source_with_tests(source, preferred_name, &[])
    }

    /// Like [`Signature::from_python_source`], using `tests` (assert
    /// statements) to type parameters that carry no annotation.
    pub fn from_python_source_with_tests(
        source: &str,
        preferred_name: Option<&str>,
        tests: &[String],
    ) -> Result<Self, SignatureError> {
        let mut found = None;
        for caps in def_regex().captures_iter(source) {
            let name = &caps[1];
            match preferred_name {
                Some(wanted) if wanted != name => continue,
                _ => {
                    found = Some(caps);
                    break;
                }
            }
        }

        let caps = match (found, preferred_name) {
            (Some(caps), _) => caps,
            (None, Some(name)) => {
                return Err(SignatureError::FunctionNotFound {
                    name: name.to_string(),
                })
            }
            (None, None) => return Err(SignatureError::NoFunction),
        };

        let name = caps[1].to_string();
        let raw_params = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let hints = infer_types_from_tests(&name, tests);

        let mut parameters = Vec::new();
        for raw in split_top_level(raw_params) {
            let raw = raw.trim();
            if raw.is_empty() || raw == "*" || raw == "/" {
                continue;
            }
            let raw = raw.trim_start_matches('*');
            let decl = raw.split_once('=').map_or(raw, |(d, _)| d.trim());
            let (pname, annotation) = match decl.split_once(':') {
                Some((n, t)) => (n.trim(), Some(t.trim())),
                None => (decl.trim(), None),
            };
            if pname == "self" || pname == "cls" {
                continue;
            }
            if !is_identifier(pname) {
                return Err(SignatureError::MalformedParameters {
                    detail: format!("`{raw}`"),
                });
            }
            let position = parameters.len();
            let py_type = annotation
                .map(str::to_string)
                .or_else(|| hints.get(position).cloned().flatten())
                .unwrap_or_else(|| "int".to_string());
            parameters.push(Parameter::new(pname, python_type_to_lean(&py_type)));
        }

        let return_type = caps
            .get(3)
            .map(|m| python_type_to_lean(m.as_str()))
            .unwrap_or_else(|| "Int".to_string());

        Ok(Self {
            name,
            parameters,
            return_type,
        })
    }

    /// Binder list such as `(xs : List Int) (k : Nat)`.
    pub fn lean_binders(&self) -> String {
        self.parameters
            .iter()
            .map(|p| format!("({} : {})", p.name, p.lean_type))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parameter names separated by spaces, for applying the function.
    pub fn argument_names(&self) -> String {
        self.parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Human-readable rendering used in prompts.
    pub fn describe(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.lean_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({}) -> {}", self.name, params, self.return_type)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on commas that are not nested in brackets or string literals.
fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in input.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '[' | '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Strip a `Wrapper[...]` generic and return the inner text.
fn generic_inner<'a>(py_type: &'a str, wrappers: &[&str]) -> Option<&'a str> {
    wrappers.iter().find_map(|w| {
        py_type
            .strip_prefix(w)
            .and_then(|rest| rest.strip_prefix('['))
            .and_then(|rest| rest.strip_suffix(']'))
    })
}

/// Map a Python annotation to a Lean 4 type.
pub fn python_type_to_lean(py_type: &str) -> String {
    let py_type = py_type.trim().trim_matches(|c| c == '\'' || c == '"');

    if py_type == "None" || py_type == "NoneType" {
        return "Unit".to_string();
    }
    if let Some(inner) = generic_inner(py_type, &["Optional"]) {
        return format!("Option {}", wrap_compound(&python_type_to_lean(inner)));
    }
    if let Some(inner) = generic_inner(py_type, &["List", "list"]) {
        return format!("List {}", wrap_compound(&python_type_to_lean(inner)));
    }
    if let Some(inner) = generic_inner(py_type, &["Dict", "dict"]) {
        let parts = split_top_level(inner);
        if parts.len() == 2 {
            return format!(
                "HashMap {} {}",
                wrap_compound(&python_type_to_lean(&parts[0])),
                wrap_compound(&python_type_to_lean(&parts[1]))
            );
        }
        return "HashMap".to_string();
    }
    if let Some(inner) = generic_inner(py_type, &["Tuple", "tuple"]) {
        let parts: Vec<String> = split_top_level(inner)
            .iter()
            .map(|p| python_type_to_lean(p))
            .collect();
        return format!("({})", parts.join(" × "));
    }
    if let Some(inner) = generic_inner(py_type, &["Set", "set"]) {
        return format!("HashSet {}", wrap_compound(&python_type_to_lean(inner)));
    }

    match py_type {
        "int" => "Int".to_string(),
        "float" => "Float".to_string(),
        "str" => "String".to_string(),
        "bool" => "Bool".to_string(),
        "list" | "List" => "List".to_string(),
        "dict" | "Dict" => "HashMap".to_string(),
        "set" | "Set" => "HashSet".to_string(),
        "tuple" | "Tuple" => "Prod".to_string(),
        other if other.chars().next().is_some_and(|c| c.is_ascii_uppercase()) => {
            other.to_string()
        }
        _ => "Int".to_string(),
    }
}

/// Parenthesize applied types so `List (List Int)` stays well-formed.
fn wrap_compound(lean_type: &str) -> String {
    if lean_type.contains(' ') && !lean_type.starts_with('(') {
        format!("({lean_type})")
    } else {
        lean_type.to_string()
    }
}

/// Infer Python types for positional arguments from `assert name(...)` lines.
fn infer_types_from_tests(name: &str, tests: &[String]) -> Vec<Option<String>> {
    let needle = format!("{name}(");
    let mut inferred: Vec<Option<String>> = Vec::new();

    for test in tests {
        let Some(start) = test.find(&needle) else {
            continue;
        };
        let args_start = start + needle.len();
        let Some(args) = matching_paren_body(&test[args_start..]) else {
            continue;
        };
        for (i, arg) in split_top_level(args).iter().enumerate() {
            if inferred.len() <= i {
                inferred.push(None);
            }
            if inferred[i].is_none() {
                inferred[i] = infer_literal_type(arg);
            }
        }
        if inferred.iter().any(Option::is_some) {
            break;
        }
    }
    inferred
}

/// Text up to the parenthesis closing an already-opened call.
fn matching_paren_body(rest: &str) -> Option<&str> {
    let mut depth = 1i32;
    let mut quote: Option<char> = None;
    for (idx, c) in rest.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn infer_literal_type(literal: &str) -> Option<String> {
    let lit = literal.trim();
    if lit.is_empty() {
        return None;
    }
    if lit == "True" || lit == "False" {
        return Some("bool".to_string());
    }
    if lit.starts_with('"') || lit.starts_with('\'') {
        return Some("str".to_string());
    }
    let numeric = lit.strip_prefix('-').unwrap_or(lit);
    if !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit()) {
        return Some("int".to_string());
    }
    if numeric.parse::<f64>().is_ok() {
        return Some("float".to_string());
    }
    if let Some(body) = lit.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return Some(match split_top_level(body).first().and_then(|e| infer_literal_type(e)) {
            Some(inner) => format!("List[{inner}]"),
            None => "list".to_string(),
        });
    }
    if let Some(body) = lit.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        let inner: Option<Vec<String>> = split_top_level(body)
            .iter()
            .map(|e| infer_literal_type(e))
            .collect();
        return Some(match inner {
            Some(types) if !types.is_empty() => format!("Tuple[{}]", types.join(", ")),
            _ => "tuple".to_string(),
        });
    }
    if let Some(body) = lit.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        let first = split_top_level(body).into_iter().next();
        return Some(match first {
            Some(entry) => match entry.split_once(':') {
                Some((k, v)) => match (infer_literal_type(k), infer_literal_type(v)) {
                    (Some(k), Some(v)) => format!("Dict[{k}, {v}]"),
                    _ => "dict".to_string(),
                },
                None => match infer_literal_type(&entry) {
                    Some(inner) => format!("Set[{inner}]"),
                    None => "set".to_string(),
                },
            },
            None => "dict".to_string(),
        });
    }
    // Constructor call such as `Pair(5, 24)`.
    let head: String = lit.chars().take_while(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
    if !head.is_empty() && lit[head.len()..].starts_with('(') {
        return Some(head);
    }
    None
}
