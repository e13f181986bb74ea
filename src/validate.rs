use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_NON_ASYNC_BOUNDARY: &str = "D-ERR-ASYNC-001";
pub const ERR_STAR_REEXPORT: &str = "D-ERR-EXPORT-001";
pub const ERR_DUPLICATE_EXPORT: &str = "D-ERR-EXPORT-002";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_NON_ASYNC_BOUNDARY => {
            "Every value invoked across the execution boundary is asynchronous."
        }
        ERR_STAR_REEXPORT => "The export set of a rewritten module is statically enumerable.",
        ERR_DUPLICATE_EXPORT => "Rewritten export names are unique per module.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformErrorKind {
    SyntaxConstraint,
    DuplicateExport,
}

/// A positioned transform-time error. `offset` is the byte offset into the
/// original source the caller handed us; `line`/`column` are 1-based and derived
/// from the same source, so the surrounding build pipeline can surface the error
/// without re-resolving positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformError {
    pub code: String,
    pub kind: TransformErrorKind,
    pub message: String,
    pub guarantee: String,
    pub module_id: String,
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

impl TransformError {
    pub fn new(
        code: &str,
        kind: TransformErrorKind,
        message: &str,
        module_id: &str,
        offset: u32,
        source: &str,
    ) -> Self {
        let (line, column) = line_column(source, offset);
        Self {
            code: code.to_string(),
            kind,
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            module_id: module_id.to_string(),
            offset,
            line,
            column,
        }
    }

    pub fn syntax_constraint(
        code: &str,
        message: &str,
        module_id: &str,
        offset: u32,
        source: &str,
    ) -> Self {
        Self::new(
            code,
            TransformErrorKind::SyntaxConstraint,
            message,
            module_id,
            offset,
            source,
        )
    }

    pub fn duplicate_export(name: &str, module_id: &str, offset: u32, source: &str) -> Self {
        Self::new(
            ERR_DUPLICATE_EXPORT,
            TransformErrorKind::DuplicateExport,
            &format!("Export name \"{}\" collides with an earlier export.", name),
            module_id,
            offset,
            source,
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}:{}:{})",
            self.code, self.message, self.module_id, self.line, self.column
        )
    }
}

impl std::error::Error for TransformError {}

/// 1-based line/column for a byte offset.
pub(crate) fn line_column(source: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(source.len());
    let mut line = 1u32;
    let mut line_start = 0usize;
    for (idx, byte) in source.as_bytes()[..offset].iter().enumerate() {
        if *byte == b'\n' {
            line += 1;
            line_start = idx + 1;
        }
    }
    (line, 1 + (offset - line_start) as u32)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRATION RUNTIME EMITTER
// ═══════════════════════════════════════════════════════════════════════════════

/// One registration call the rewriter wants emitted. `value` is the expression
/// the runtime should mark (`None` under replace-in-place, where the original
/// implementation is unreachable in this artifact).
pub struct RegisterCall<'c> {
    pub value: Option<&'c str>,
    pub id: &'c str,
    pub name: &'c str,
}

/// Caller-supplied codegen closure producing the registration call text, e.g.
/// `register(hoist_0_f, "app/actions.js#hoist_0_f", "hoist_0_f")`.
pub type RuntimeEmitter = Box<dyn Fn(&RegisterCall<'_>) -> String>;
