//! Free-variable resolution for functions about to be hoisted to module top
//! level. A captured name is one referenced inside the function but declared in
//! an enclosing scope that is neither the module's own top level (still
//! directly reachable after the hoist) nor a scope inside the function itself.

use crate::scope::{Resolution, ScopeGraph, ScopeId};
use oxc_span::Span;
use std::collections::HashSet;

/// The minimal set of names that must be bound across the hoist, ordered by
/// enclosing scope (outermost first) then by declaration order within each
/// scope. The order is what `.bind(null, ...)` arguments and the hoisted
/// function's leading parameters are emitted in.
pub fn free_variables(graph: &ScopeGraph, function_span: Span) -> Vec<String> {
    let (start, end) = (function_span.start, function_span.end);
    let mut seen: HashSet<String> = HashSet::new();
    let mut captured: Vec<(u32, usize, String)> = Vec::new();

    for reference in graph.references_within(start, end) {
        let scope = match graph.resolve_reference(reference) {
            Resolution::Declared(scope) => scope,
            Resolution::Global => continue,
        };
        if scope == ScopeId::ROOT {
            continue;
        }
        if graph.scope_within(scope, start, end) {
            continue;
        }
        if !seen.insert(reference.name.clone()) {
            continue;
        }
        let depth = graph.scope(scope).depth;
        let index = graph
            .declaration_index(scope, &reference.name)
            .unwrap_or(usize::MAX);
        captured.push((depth, index, reference.name.clone()));
    }

    captured.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));
    captured.into_iter().map(|(_, _, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::analyze_scope;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn captures_of(source: &str, marker: &str) -> Vec<String> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();
        assert!(ret.errors.is_empty(), "parse errors: {:?}", ret.errors);
        let graph = analyze_scope(&ret.program);
        let start = source.find(marker).expect("marker not found") as u32;
        let end = start + span_len(source, marker);
        free_variables(&graph, oxc_span::Span::new(start, end))
    }

    // The tagged function's span: from the marker to the matching close brace.
    fn span_len(source: &str, marker: &str) -> u32 {
        let start = source.find(marker).unwrap();
        let open = source[start..].find('{').unwrap() + start;
        let mut depth = 0usize;
        for (i, b) in source.as_bytes()[open..].iter().enumerate() {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return (open + i + 1 - start) as u32;
                    }
                }
                _ => {}
            }
        }
        panic!("unbalanced braces after marker");
    }

    #[test]
    fn module_level_bindings_are_not_captured() {
        let source = "let count = 0;\nfunction Counter() {\n  const name = \"value\";\n  async function changeCount(formData) {\n    count += Number(formData.get(name));\n  }\n  return changeCount;\n}";
        let captured = captures_of(source, "async function changeCount");
        assert_eq!(captured, vec!["name".to_string()]);
    }

    #[test]
    fn parameters_and_locals_stay_internal() {
        let source =
            "function outer(a) {\n  function inner(b) {\n    const c = b;\n    return a + b + c;\n  }\n}";
        let captured = captures_of(source, "function inner");
        assert_eq!(captured, vec!["a".to_string()]);
    }

    #[test]
    fn capture_order_is_outer_scope_then_declaration_order() {
        let source = "function outer() {\n  const first = 1;\n  const second = 2;\n  return () => {\n    let third = 3;\n    const inner = () => { return second + first + third; };\n    return inner;\n  };\n}";
        let captured = captures_of(source, "const inner");
        // `first`/`second` live in the outer function scope (declaration
        // order), `third` in the nested arrow's scope below them.
        assert_eq!(
            captured,
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn shadowed_names_resolve_to_inner_declaration() {
        let source = "function outer() {\n  const v = 1;\n  function tagged() {\n    const v = 2;\n    return v;\n  }\n}";
        let captured = captures_of(source, "function tagged");
        assert!(captured.is_empty());
    }

    #[test]
    fn globals_are_never_captured() {
        let source = "function outer() {\n  const n = 1;\n  function tagged() {\n    return Math.max(n, parseInt(\"2\"));\n  }\n}";
        let captured = captures_of(source, "function tagged");
        assert_eq!(captured, vec!["n".to_string()]);
    }
}
