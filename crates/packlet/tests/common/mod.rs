//! Shared helpers for integration tests.
//!
//! [`compile`] turns lowered module code into a runtime body for a small
//! subset of statements:
//!
//! - `Object.defineProperty(exports, "name", { ... return expr; ... })` getters
//! - `require("m");` and `var`/`let`/`const` declarations
//! - `name = expr;` assignments and `trace("label");` calls
//!
//! An expression is a JSON literal, a binding, `binding.name` or
//! `require("m")`. Getters read the module scope when called, so exports stay
//! live the way they do under a JavaScript engine. That is enough to observe
//! load order, memoization and live bindings in cycles.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use packlet::module_graph::Module;
use packlet::resolver::DEFAULT_EXTENSIONS;
use packlet::runtime::{Exports, ModuleBody, Require, RuntimeError};
use serde_json::Value;

pub fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| (*ext).to_owned()).collect()
}

/// Write `files` (relative path, content) below `root`.
pub fn write_project(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

/// Ids of executed modules and `trace` labels, in execution order.
pub type ExecutionLog = Rc<RefCell<Vec<String>>>;

type Scope = Rc<RefCell<HashMap<String, Binding>>>;

#[derive(Debug, Clone)]
enum Expr {
    Require(String),
    Member(String, String),
    Ident(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
enum Stmt {
    Eval(Expr),
    Declare(Vec<(String, Expr)>),
    Assign(String, Expr),
    Getter(String, Expr),
    Trace(String),
}

#[derive(Debug, Clone)]
enum Binding {
    Module(Exports),
    Value(Value),
}

impl Binding {
    fn into_value(self) -> Value {
        match self {
            Self::Module(exports) => exports.to_json(),
            Self::Value(value) => value,
        }
    }

    fn member(self, name: &str) -> Option<Value> {
        match self {
            Self::Module(exports) => exports.get(name),
            Self::Value(value) => value.get(name).cloned(),
        }
    }
}

pub fn compile(module: &Module) -> Result<ModuleBody, RuntimeError> {
    compile_logged(module, &ExecutionLog::default())
}

/// Like [`compile`], recording each execution of the module and each
/// `trace` call in `log`.
pub fn compile_logged(module: &Module, log: &ExecutionLog) -> Result<ModuleBody, RuntimeError> {
    let statements = split_statements(module.code())
        .into_iter()
        .filter(|statement| *statement != "\"use strict\"")
        .map(|statement| {
            parse_statement(statement).ok_or_else(|| {
                RuntimeError::execution(module.id(), format!("unsupported statement: {statement}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let id = module.id().to_string();
    let log = Rc::clone(log);
    Ok(Box::new(move |require: &mut Require<'_, '_>, exports: &Exports| {
        log.borrow_mut().push(id.clone());
        let scope = Scope::default();
        for statement in &statements {
            match statement {
                Stmt::Eval(expr) => {
                    eval(expr, require, &scope)?;
                }
                Stmt::Declare(declarators) => {
                    for (name, expr) in declarators {
                        let binding = eval(expr, require, &scope)?;
                        scope.borrow_mut().insert(name.clone(), binding);
                    }
                }
                Stmt::Assign(name, expr) => {
                    let binding = eval(expr, require, &scope)?;
                    if !scope.borrow().contains_key(name) {
                        return Err(RuntimeError::execution(
                            require.importer(),
                            format!("{name} is not defined"),
                        ));
                    }
                    scope.borrow_mut().insert(name.clone(), binding);
                }
                Stmt::Getter(name, expr) => {
                    let expr = expr.clone();
                    let scope = Rc::clone(&scope);
                    exports.define_getter(name.clone(), move || read(&expr, &scope));
                }
                Stmt::Trace(label) => log.borrow_mut().push(label.clone()),
            }
        }
        Ok(())
    }))
}

fn lookup(scope: &Scope, name: &str) -> Option<Binding> {
    scope.borrow().get(name).cloned()
}

/// Evaluate inside a getter: no `require`, and `None` for a binding that
/// has not been declared yet.
fn read(expr: &Expr, scope: &Scope) -> Option<Value> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::Ident(name) => lookup(scope, name).map(Binding::into_value),
        Expr::Member(object, name) => lookup(scope, object)?.member(name),
        Expr::Require(_) => None,
    }
}

fn eval(
    expr: &Expr,
    require: &mut Require<'_, '_>,
    scope: &Scope,
) -> Result<Binding, RuntimeError> {
    let not_defined =
        |name: &str| RuntimeError::execution(require.importer(), format!("{name} is not defined"));
    Ok(match expr {
        Expr::Require(specifier) => Binding::Module(require.require(specifier)?),
        Expr::Member(object, name) => {
            let binding = lookup(scope, object).ok_or_else(|| not_defined(object))?;
            Binding::Value(binding.member(name).unwrap_or(Value::Null))
        }
        Expr::Ident(name) => lookup(scope, name).ok_or_else(|| not_defined(name))?,
        Expr::Literal(value) => Binding::Value(value.clone()),
    })
}

/// Split on `;` and newlines outside double-quoted strings and brackets.
fn split_statements(code: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in code.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth = depth.saturating_sub(1),
            ';' | '\n' if depth == 0 => {
                statements.push(code[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    statements.push(code[start..].trim());
    statements.retain(|statement| !statement.is_empty());
    statements
}

fn parse_statement(statement: &str) -> Option<Stmt> {
    if let Some(rest) = statement.strip_prefix("Object.defineProperty(exports, ") {
        let (quoted, tail) =
            rest.split_once(", { enumerable: true, get: function () { return ")?;
        let expr = tail.strip_suffix("; } })")?;
        let name = serde_json::from_str::<String>(quoted).ok()?;
        return Some(Stmt::Getter(name, parse_expr(expr)?));
    }

    if let Some(rest) = statement.strip_prefix("trace(") {
        let label = serde_json::from_str::<String>(rest.strip_suffix(')')?).ok()?;
        return Some(Stmt::Trace(label));
    }

    for keyword in ["var ", "let ", "const "] {
        if let Some(rest) = statement.strip_prefix(keyword) {
            let declarators = split_top_level_commas(rest)
                .into_iter()
                .map(|declarator| {
                    let (name, expr) = declarator.split_once('=')?;
                    Some((name.trim().to_owned(), parse_expr(expr.trim())?))
                })
                .collect::<Option<Vec<_>>>()?;
            return Some(Stmt::Declare(declarators));
        }
    }

    if let Some((target, expr)) = statement.split_once(" = ") {
        if is_identifier(target) {
            return Some(Stmt::Assign(target.to_owned(), parse_expr(expr.trim())?));
        }
        return None;
    }

    parse_expr(statement).map(Stmt::Eval)
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ',' if !in_string => {
                parts.push(text[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn parse_expr(text: &str) -> Option<Expr> {
    if let Some(rest) = text.strip_prefix("require(") {
        let specifier = serde_json::from_str::<String>(rest.strip_suffix(')')?).ok()?;
        return Some(Expr::Require(specifier));
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(Expr::Literal(value));
    }

    if let Some((object, member)) = text.split_once('.') {
        if is_identifier(object) && is_identifier(member) {
            return Some(Expr::Member(object.to_owned(), member.to_owned()));
        }
        return None;
    }

    is_identifier(text).then(|| Expr::Ident(text.to_owned()))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
