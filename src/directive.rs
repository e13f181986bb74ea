//! Marker-directive detection.
//!
//! A directive is an expression statement whose value is a string literal,
//! placed in a module body or a function body. Detection is deliberately
//! lenient: the *entire* statement list is scanned, not just the leading
//! prologue, matching the accepted behavior of the surrounding pipeline.

use oxc_ast::ast::{Directive, Expression, FunctionBody, Program, Statement};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What to look for: an exact tag, or a pattern whose capture groups
/// discriminate sub-variants of one directive family (e.g. storage targets).
pub enum DirectiveSpec {
    Exact(String),
    Pattern(Regex),
}

impl DirectiveSpec {
    pub fn exact(tag: impl Into<String>) -> Self {
        DirectiveSpec::Exact(tag.into())
    }

    pub fn pattern(pattern: Regex) -> Self {
        DirectiveSpec::Pattern(pattern)
    }

    fn match_value(&self, value: &str) -> Option<Vec<Option<String>>> {
        match self {
            DirectiveSpec::Exact(tag) => (value == tag).then(Vec::new),
            DirectiveSpec::Pattern(pattern) => pattern.captures(value).map(|caps| {
                (1..caps.len())
                    .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                    .collect()
            }),
        }
    }
}

/// A detected directive with its capture groups (empty for exact matches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveMatch {
    pub tag: String,
    pub groups: Vec<Option<String>>,
    pub start: u32,
    pub end: u32,
}

/// Scans a directive prologue plus a full statement list. First match wins.
pub fn scan_statement_list<'a>(
    directives: &[Directive<'a>],
    statements: &[Statement<'a>],
    spec: &DirectiveSpec,
) -> Option<DirectiveMatch> {
    for directive in directives {
        let value = directive.expression.value.as_str();
        if let Some(groups) = spec.match_value(value) {
            return Some(DirectiveMatch {
                tag: value.to_string(),
                groups,
                start: directive.span.start,
                end: directive.span.end,
            });
        }
    }
    for statement in statements {
        if let Statement::ExpressionStatement(stmt) = statement {
            if let Expression::StringLiteral(literal) = &stmt.expression {
                if let Some(groups) = spec.match_value(literal.value.as_str()) {
                    return Some(DirectiveMatch {
                        tag: literal.value.to_string(),
                        groups,
                        start: stmt.span.start,
                        end: stmt.span.end,
                    });
                }
            }
        }
    }
    None
}

/// Does the module itself carry the directive?
pub fn has_module_directive(program: &Program, spec: &DirectiveSpec) -> Option<DirectiveMatch> {
    scan_statement_list(&program.directives, &program.body, spec)
}

/// Does this function body carry the directive?
pub fn has_function_directive(body: &FunctionBody, spec: &DirectiveSpec) -> Option<DirectiveMatch> {
    scan_statement_list(&body.directives, &body.statements, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn with_program<F: FnOnce(&Program)>(source: &str, f: F) {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();
        assert!(ret.errors.is_empty(), "parse errors: {:?}", ret.errors);
        f(&ret.program);
    }

    #[test]
    fn leading_module_directive_matches_exact_tag() {
        with_program("\"use boundary\";\nexport const a = 1;", |program| {
            let spec = DirectiveSpec::exact("use boundary");
            let m = has_module_directive(program, &spec).unwrap();
            assert_eq!(m.tag, "use boundary");
            assert!(m.groups.is_empty());
        });
    }

    #[test]
    fn directive_detected_anywhere_in_body() {
        // Lenient by design: a directive after other statements is still
        // honored. Pinned so tightening this is a deliberate change.
        with_program("const a = 1;\n\"use boundary\";\nconst b = 2;", |program| {
            let spec = DirectiveSpec::exact("use boundary");
            assert!(has_module_directive(program, &spec).is_some());
        });
    }

    #[test]
    fn non_matching_literals_are_ignored() {
        with_program("\"use strict\";\nconst a = \"use boundary\";", |program| {
            let spec = DirectiveSpec::exact("use boundary");
            assert!(has_module_directive(program, &spec).is_none());
        });
    }

    #[test]
    fn pattern_directive_captures_groups() {
        with_program("\"use cache: kv\";\nexport const a = 1;", |program| {
            let spec = DirectiveSpec::pattern(Regex::new(r"^use cache(?:: (\w+))?$").unwrap());
            let m = has_module_directive(program, &spec).unwrap();
            assert_eq!(m.tag, "use cache: kv");
            assert_eq!(m.groups, vec![Some("kv".to_string())]);
        });
    }

    #[test]
    fn pattern_directive_without_group_yields_none_entry() {
        with_program("\"use cache\";", |program| {
            let spec = DirectiveSpec::pattern(Regex::new(r"^use cache(?:: (\w+))?$").unwrap());
            let m = has_module_directive(program, &spec).unwrap();
            assert_eq!(m.groups, vec![None]);
        });
    }

    #[test]
    fn function_body_directive_matches() {
        with_program(
            "function outer() { async function inner() { \"use boundary\"; } }",
            |program| {
                let spec = DirectiveSpec::exact("use boundary");
                // Dig out inner's body.
                let Statement::FunctionDeclaration(outer) = &program.body[0] else {
                    panic!("expected function declaration");
                };
                let outer_body = outer.body.as_ref().unwrap();
                let Statement::FunctionDeclaration(inner) = &outer_body.statements[0] else {
                    panic!("expected nested function declaration");
                };
                let inner_body = inner.body.as_ref().unwrap();
                assert!(has_function_directive(inner_body, &spec).is_some());
                assert!(has_module_directive(program, &spec).is_none());
            },
        );
    }
}
