//! Lexical scope analysis over a parsed module.
//!
//! Builds a [`ScopeGraph`] in one traversal: a scope is pushed at every
//! function/arrow boundary and at block-scoped statement forms, declared names
//! are recorded per scope (declarations, destructured bindings including rest
//! elements, parameters, catch params), and every identifier reference is
//! collected with the scope it occurred in. References are resolved
//! nearest-enclosing-first once the walk is complete, which keeps hoisted
//! function declarations resolvable from earlier statements.
//!
//! The analyzer has no side effects and owns no shared state; it is safe to run
//! on many modules concurrently.

use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, BlockStatement, CatchClause, Class, ClassType,
    ForInStatement, ForOfStatement, ForStatement, Function, FunctionType, IdentifierReference,
    Program, StaticBlock,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The module's own top-level scope.
    pub const ROOT: Self = Self(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
    Class,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub start: u32,
    pub end: u32,
    pub depth: u32,
    declared: Vec<String>,
    declared_set: HashSet<String>,
}

impl Scope {
    /// Names declared directly in this scope, in declaration order.
    pub fn declared_names(&self) -> &[String] {
        &self.declared
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declared_set.contains(name)
    }
}

/// A non-declaration identifier use, tagged with the scope it occurred in.
#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub start: u32,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The nearest enclosing scope declaring the name.
    Declared(ScopeId),
    /// Not found in any scope up to and including the module top level.
    Global,
}

#[derive(Debug)]
pub struct ScopeGraph {
    scopes: Vec<Scope>,
    references: Vec<Reference>,
}

impl ScopeGraph {
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// References whose span start lies within `[start, end)`.
    pub fn references_within(&self, start: u32, end: u32) -> impl Iterator<Item = &Reference> {
        self.references
            .iter()
            .filter(move |r| r.start >= start && r.start < end)
    }

    pub fn resolve_from(&self, scope: ScopeId, name: &str) -> Resolution {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = self.scope(id);
            if data.declares(name) {
                return Resolution::Declared(id);
            }
            current = data.parent;
        }
        Resolution::Global
    }

    pub fn resolve_reference(&self, reference: &Reference) -> Resolution {
        self.resolve_from(reference.scope, &reference.name)
    }

    /// Position of `name` in the scope's declaration order.
    pub fn declaration_index(&self, scope: ScopeId, name: &str) -> Option<usize> {
        self.scope(scope).declared.iter().position(|n| n == name)
    }

    /// Whether the scope's span is fully contained in `[start, end)`.
    pub fn scope_within(&self, scope: ScopeId, start: u32, end: u32) -> bool {
        let data = self.scope(scope);
        data.start >= start && data.end <= end
    }
}

/// Builds the scope graph for a module body. Pure function of the AST.
pub fn analyze_scope(program: &Program) -> ScopeGraph {
    let mut builder = ScopeBuilder {
        scopes: Vec::new(),
        stack: Vec::new(),
        references: Vec::new(),
    };
    builder.visit_program(program);
    ScopeGraph {
        scopes: builder.scopes,
        references: builder.references,
    }
}

struct ScopeBuilder {
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
    references: Vec<Reference>,
}

impl ScopeBuilder {
    fn push(&mut self, kind: ScopeKind, span: Span) {
        let parent = self.stack.last().copied();
        let depth = parent.map(|p| self.scopes[p.index()].depth + 1).unwrap_or(0);
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            kind,
            start: span.start,
            end: span.end,
            depth,
            declared: Vec::new(),
            declared_set: HashSet::new(),
        });
        self.stack.push(id);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn declare(&mut self, name: &str) {
        let id = match self.stack.last() {
            Some(id) => *id,
            None => return,
        };
        let scope = &mut self.scopes[id.index()];
        if scope.declared_set.insert(name.to_string()) {
            scope.declared.push(name.to_string());
        }
    }
}

impl<'a> Visit<'a> for ScopeBuilder {
    fn visit_program(&mut self, program: &Program<'a>) {
        self.push(ScopeKind::Module, program.span);
        walk::walk_program(self, program);
        self.pop();
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        // A declaration's name binds in the surrounding scope; an expression's
        // name binds only inside the function itself (walk re-declares it there,
        // so named function expressions never resolve their own name as free).
        if matches!(func.r#type, FunctionType::FunctionDeclaration) {
            if let Some(id) = &func.id {
                self.declare(id.name.as_str());
            }
        }
        self.push(ScopeKind::Function, func.span);
        walk::walk_function(self, func, flags);
        self.pop();
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        self.push(ScopeKind::Function, func.span);
        walk::walk_arrow_function_expression(self, func);
        self.pop();
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        if matches!(class.r#type, ClassType::ClassDeclaration) {
            if let Some(id) = &class.id {
                self.declare(id.name.as_str());
            }
        }
        self.push(ScopeKind::Class, class.span);
        walk::walk_class(self, class);
        self.pop();
    }

    fn visit_block_statement(&mut self, block: &BlockStatement<'a>) {
        self.push(ScopeKind::Block, block.span);
        walk::walk_block_statement(self, block);
        self.pop();
    }

    fn visit_static_block(&mut self, block: &StaticBlock<'a>) {
        self.push(ScopeKind::Block, block.span);
        walk::walk_static_block(self, block);
        self.pop();
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        self.push(ScopeKind::Block, clause.span);
        walk::walk_catch_clause(self, clause);
        self.pop();
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.push(ScopeKind::Block, stmt.span);
        walk::walk_for_statement(self, stmt);
        self.pop();
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        self.push(ScopeKind::Block, stmt.span);
        walk::walk_for_in_statement(self, stmt);
        self.pop();
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        self.push(ScopeKind::Block, stmt.span);
        walk::walk_for_of_statement(self, stmt);
        self.pop();
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.declare(ident.name.as_str());
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let scope = match self.stack.last() {
            Some(id) => *id,
            None => return,
        };
        self.references.push(Reference {
            name: ident.name.to_string(),
            start: ident.span().start,
            scope,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn with_graph<F: FnOnce(&ScopeGraph)>(source: &str, f: F) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();
        assert!(ret.errors.is_empty(), "parse errors: {:?}", ret.errors);
        f(&analyze_scope(&ret.program));
    }

    fn resolve_named(graph: &ScopeGraph, name: &str) -> Vec<Resolution> {
        graph
            .references()
            .iter()
            .filter(|r| r.name == name)
            .map(|r| graph.resolve_reference(r))
            .collect()
    }

    #[test]
    fn module_level_declarations_resolve_to_root() {
        with_graph("let count = 0;\nfunction f() { return count; }", |graph| {
            assert_eq!(
                resolve_named(graph, "count"),
                vec![Resolution::Declared(ScopeId::ROOT)]
            );
        });
    }

    #[test]
    fn unknown_names_are_global() {
        with_graph("console.log(1);", |graph| {
            assert_eq!(resolve_named(graph, "console"), vec![Resolution::Global]);
        });
    }

    #[test]
    fn destructured_bindings_including_rest_are_declared() {
        with_graph("const { a, b: renamed, ...rest } = obj; const [x, ...ys] = arr;", |graph| {
            let root = graph.scope(ScopeId::ROOT);
            for name in ["a", "renamed", "rest", "x", "ys"] {
                assert!(root.declares(name), "expected {} declared at root", name);
            }
            assert!(!root.declares("b"));
        });
    }

    #[test]
    fn named_function_expression_self_reference_is_not_free() {
        with_graph("const f = function inner() { return inner; };", |graph| {
            let resolutions = resolve_named(graph, "inner");
            assert_eq!(resolutions.len(), 1);
            match resolutions[0] {
                Resolution::Declared(id) => {
                    assert_eq!(graph.scope(id).kind, ScopeKind::Function);
                }
                Resolution::Global => panic!("self reference escaped to global"),
            }
        });
    }

    #[test]
    fn shadowing_resolves_to_nearest_scope() {
        with_graph(
            "let x = 1;\nfunction outer() { let x = 2; return () => x; }",
            |graph| {
                let inner_use = graph
                    .references()
                    .iter()
                    .filter(|r| r.name == "x")
                    .last()
                    .unwrap();
                match graph.resolve_reference(inner_use) {
                    Resolution::Declared(id) => assert_ne!(id, ScopeId::ROOT),
                    Resolution::Global => panic!("shadowed x resolved as global"),
                }
            },
        );
    }

    #[test]
    fn catch_params_and_function_hoisting_resolve() {
        with_graph(
            "try { before(); } catch (err) { report(err); }\nfunction report(e) {}\nfunction before() {}",
            |graph| {
                assert_eq!(
                    resolve_named(graph, "report"),
                    vec![Resolution::Declared(ScopeId::ROOT)]
                );
                let err_res = resolve_named(graph, "err");
                assert_eq!(err_res.len(), 1);
                assert!(matches!(err_res[0], Resolution::Declared(id) if id != ScopeId::ROOT));
            },
        );
    }

    #[test]
    fn references_within_filters_by_span() {
        let source = "let a = 1; function f() { return a + b; }";
        with_graph(source, |graph| {
            let fn_start = source.find("function").unwrap() as u32;
            let names: Vec<_> = graph
                .references_within(fn_start, source.len() as u32)
                .map(|r| r.name.clone())
                .collect();
            assert_eq!(names, vec!["a", "b"]);
        });
    }
}
