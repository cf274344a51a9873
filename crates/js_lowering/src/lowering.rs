//! Lowering of static module syntax to the two-binding loader form.
//!
//! The lowered code expects `require` and `exports` to be in scope and is laid
//! out the way an ES module evaluates:
//!
//! 1. every export is published up front as an enumerable getter on
//!    `exports`, so importers always read the current value of the binding;
//! 2. every module request (`import` and `export ... from`) is hoisted into a
//!    `require` call, in source order, ahead of the module body;
//! 3. the body follows with import statements removed, `export` keywords
//!    stripped, and every reference to an imported binding rewritten to a
//!    property read on the dependency's exports object.
//!
//! Code the module syntax does not touch is copied through verbatim.

use oxc_allocator::Allocator;
use oxc_ast::AstKind;
use oxc_ast::ast::{
    BindingPattern, BindingPatternKind, Declaration, ExportAllDeclaration,
    ExportDefaultDeclaration, ExportDefaultDeclarationKind, ExportNamedDeclaration, Expression,
    ImportDeclaration, ImportDeclarationSpecifier, Program, Statement,
};
use oxc_parser::Parser;
use oxc_semantic::{Semantic, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::SyntaxError;
use crate::utils::{member, quote};

const STRICT_PROLOGUE: &str = "\"use strict\";\n";

/// Local binding that holds an anonymous `export default` value.
const DEFAULT_BINDING: &str = "__default";

/// A module rewritten for the loader, plus what the rewrite learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredModule {
    /// Static module requests in source order, duplicates kept.
    pub import_specifiers: Vec<String>,
    /// Names published on `exports`, excluding `export *` forwarding.
    pub exported_names: Vec<String>,
    pub code: String,
}

/// Parse `source` as an ES module and lower it.
///
/// Any parse or early error is reported as a [`SyntaxError`] positioned at the
/// first labelled span of the diagnostic.
pub fn lower_module(source: &str) -> Result<LoweredModule, SyntaxError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(diagnostic) = parsed.errors.first() {
        return Err(SyntaxError::from_diagnostic(source, diagnostic));
    }
    if parsed.panicked {
        return Err(SyntaxError::at(source, source.len(), "unexpected end of module"));
    }

    let checked = SemanticBuilder::new()
        .with_check_syntax_error(true)
        .build(&parsed.program);
    if let Some(diagnostic) = checked.errors.first() {
        return Err(SyntaxError::from_diagnostic(source, diagnostic));
    }

    let mut lowering = Lowering::new(source);
    lowering.collect(&parsed.program, &checked.semantic);
    Ok(lowering.finish())
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Lowering<'s> {
    source: &'s str,
    edits: Vec<Edit>,
    /// `Object.defineProperty` getters, emitted first.
    getters: Vec<String>,
    /// Hoisted `require` calls, emitted after the getters.
    requests: Vec<String>,
    import_specifiers: Vec<String>,
    exported_names: Vec<String>,
    /// Replacement expression for each imported binding.
    import_bindings: FxHashMap<SymbolId, String>,
    /// The same replacements by local name, for `export { name }` lists.
    imported_names: FxHashMap<String, String>,
    next_temp: usize,
}

impl<'s> Lowering<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
            getters: Vec::new(),
            requests: Vec::new(),
            import_specifiers: Vec::new(),
            exported_names: Vec::new(),
            import_bindings: FxHashMap::default(),
            imported_names: FxHashMap::default(),
            next_temp: 0,
        }
    }

    fn collect(&mut self, program: &Program<'_>, semantic: &Semantic<'_>) {
        if let Some(hashbang) = &program.hashbang {
            self.replace(hashbang.span, String::new());
        }

        // Module requests first, in source order, so the hoisted requires
        // evaluate dependencies in the order the module lists them.
        for statement in &program.body {
            match statement {
                Statement::ImportDeclaration(import) => self.lower_import(import),
                Statement::ExportNamedDeclaration(export) if export.source.is_some() => {
                    self.lower_reexport(export);
                }
                Statement::ExportAllDeclaration(export) => self.lower_export_all(export),
                _ => {}
            }
        }

        for statement in &program.body {
            match statement {
                Statement::ExportNamedDeclaration(export) if export.source.is_none() => {
                    self.lower_local_export(export);
                }
                Statement::ExportDefaultDeclaration(export) => self.lower_default_export(export),
                _ => {}
            }
        }

        self.rewrite_import_references(semantic);
    }

    fn lower_import(&mut self, import: &ImportDeclaration<'_>) {
        let specifier = import.source.value.as_str();
        self.replace(import.span, String::new());

        let Some(bindings) = import.specifiers.as_ref().filter(|list| !list.is_empty()) else {
            self.import_specifiers.push(specifier.to_owned());
            self.requests.push(format!("require({});", quote(specifier)));
            return;
        };

        let temp = self.request_binding(specifier);
        for binding in bindings {
            let (local, value) = match binding {
                ImportDeclarationSpecifier::ImportSpecifier(named) => {
                    (&named.local, member(&temp, named.imported.name().as_str()))
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(default) => {
                    (&default.local, member(&temp, "default"))
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(namespace) => {
                    (&namespace.local, temp.clone())
                }
            };
            self.import_bindings.insert(local.symbol_id(), value.clone());
            self.imported_names.insert(local.name.to_string(), value);
        }
    }

    fn lower_reexport(&mut self, export: &ExportNamedDeclaration<'_>) {
        let Some(source) = &export.source else {
            return;
        };
        let temp = self.request_binding(source.value.as_str());
        self.replace(export.span, String::new());
        for specifier in &export.specifiers {
            let value = member(&temp, specifier.local.name().as_str());
            self.publish(specifier.exported.name().to_string(), &value);
        }
    }

    fn lower_export_all(&mut self, export: &ExportAllDeclaration<'_>) {
        let temp = self.request_binding(export.source.value.as_str());
        self.replace(export.span, String::new());
        match &export.exported {
            Some(alias) => self.publish(alias.name().to_string(), &temp),
            // Runs after the getters above, so local exports take precedence.
            None => self.requests.push(format!(
                "Object.keys({temp}).forEach(function (key) {{ \
                 if (key === \"default\" || Object.prototype.hasOwnProperty.call(exports, key)) return; \
                 Object.defineProperty(exports, key, {{ enumerable: true, get: function () {{ return {temp}[key]; }} }}); }});"
            )),
        }
    }

    fn lower_local_export(&mut self, export: &ExportNamedDeclaration<'_>) {
        if let Some(declaration) = &export.declaration {
            self.replace(Span::new(export.span.start, declaration.span().start), String::new());
            for name in declared_names(declaration) {
                self.publish(name.clone(), &name);
            }
            return;
        }

        self.replace(export.span, String::new());
        for specifier in &export.specifiers {
            let local = specifier.local.name();
            let value = self
                .imported_names
                .get(local.as_str())
                .cloned()
                .unwrap_or_else(|| local.to_string());
            self.publish(specifier.exported.name().to_string(), &value);
        }
    }

    fn lower_default_export(&mut self, export: &ExportDefaultDeclaration<'_>) {
        let start = export.span.start;
        match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(function) => {
                self.replace(Span::new(start, function.span.start), String::new());
                let name = if let Some(id) = &function.id {
                    id.name.to_string()
                } else {
                    // Name it so the declaration stays hoisted.
                    let at = function.params.span.start;
                    let gap = if self.source[..at as usize].ends_with(char::is_whitespace) {
                        ""
                    } else {
                        " "
                    };
                    self.replace(Span::new(at, at), format!("{gap}{DEFAULT_BINDING}"));
                    DEFAULT_BINDING.to_owned()
                };
                self.publish("default".to_owned(), &name);
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) if class.id.is_some() => {
                self.replace(Span::new(start, class.span.start), String::new());
                let name = class.id.as_ref().map(|id| id.name.to_string()).unwrap_or_default();
                self.publish("default".to_owned(), &name);
            }
            value => {
                self.replace(
                    Span::new(start, value.span().start),
                    format!("const {DEFAULT_BINDING} = "),
                );
                let end = export.span.end;
                if !self.source[..end as usize].ends_with(';') {
                    self.replace(Span::new(end, end), ";".to_owned());
                }
                self.publish("default".to_owned(), DEFAULT_BINDING);
            }
        }
    }

    /// Point every resolved reference to an imported binding at the
    /// dependency's exports object. Shadowed names resolve to other symbols
    /// and are left alone.
    fn rewrite_import_references(&mut self, semantic: &Semantic<'_>) {
        if self.import_bindings.is_empty() {
            return;
        }

        let mut shorthand = FxHashSet::default();
        let mut callees = FxHashSet::default();
        for node in semantic.nodes().iter() {
            match node.kind() {
                AstKind::ObjectProperty(property) if property.shorthand => {
                    shorthand.insert(property.value.span().start);
                }
                AstKind::CallExpression(call) => {
                    if let Expression::Identifier(callee) = &call.callee {
                        callees.insert(callee.span.start);
                    }
                }
                AstKind::TaggedTemplateExpression(tagged) => {
                    if let Expression::Identifier(tag) = &tagged.tag {
                        callees.insert(tag.span.start);
                    }
                }
                _ => {}
            }
        }

        let scoping = semantic.scoping();
        for node in semantic.nodes().iter() {
            let AstKind::IdentifierReference(ident) = node.kind() else {
                continue;
            };
            let Some(symbol) = scoping.get_reference(ident.reference_id()).symbol_id() else {
                continue;
            };
            let Some(value) = self.import_bindings.get(&symbol) else {
                continue;
            };
            let text = if shorthand.contains(&ident.span.start) {
                format!("{}: {value}", ident.name)
            } else if callees.contains(&ident.span.start) {
                // Calls through an import do not receive the exports object as `this`.
                format!("(0, {value})")
            } else {
                value.clone()
            };
            self.replace(ident.span, text);
        }
    }

    fn request_binding(&mut self, specifier: &str) -> String {
        let temp = format!("__dep{}", self.next_temp);
        self.next_temp += 1;
        self.import_specifiers.push(specifier.to_owned());
        self.requests
            .push(format!("var {temp} = require({});", quote(specifier)));
        temp
    }

    fn publish(&mut self, exported: String, value: &str) {
        self.getters.push(format!(
            "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {value}; }} }});",
            quote(&exported)
        ));
        self.exported_names.push(exported);
    }

    fn replace(&mut self, span: Span, text: String) {
        self.edits.push(Edit {
            start: span.start as usize,
            end: span.end as usize,
            text,
        });
    }

    fn finish(mut self) -> LoweredModule {
        self.edits.sort_by_key(|edit| (edit.start, edit.end));

        let mut code = String::with_capacity(self.source.len() + 64 * self.getters.len());
        code.push_str(STRICT_PROLOGUE);
        for line in self.getters.iter().chain(&self.requests) {
            code.push_str(line);
            code.push('\n');
        }

        let mut cursor = 0;
        for edit in &self.edits {
            // Starts inside a statement that was already removed.
            if edit.start < cursor {
                continue;
            }
            code.push_str(&self.source[cursor..edit.start]);
            code.push_str(&edit.text);
            cursor = edit.end;
        }
        code.push_str(&self.source[cursor..]);

        LoweredModule {
            import_specifiers: self.import_specifiers,
            exported_names: self.exported_names,
            code,
        }
    }
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(variables) => {
            for declarator in &variables.declarations {
                collect_bound_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(function) => {
            names.extend(function.id.iter().map(|id| id.name.to_string()));
        }
        Declaration::ClassDeclaration(class) => {
            names.extend(class.id.iter().map(|id| id.name.to_string()));
        }
        // type-only declarations publish nothing
        _ => {}
    }
    names
}

fn collect_bound_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(ident) => names.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                collect_bound_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                collect_bound_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                collect_bound_names(element, names);
            }
            if let Some(rest) = &array.rest {
                collect_bound_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assignment) => {
            collect_bound_names(&assignment.left, names);
        }
    }
}
