//! # Directive Transform Core (Boundary Lock)
//!
//! Source-to-source rewriting of directive-tagged modules into registry-backed
//! boundary references, plus the runtime that resolves those references by id.
//!
//! ## Binding Invariants
//!
//! 1. **Determinism**: transforming byte-identical input (fresh parse each
//!    time) yields byte-identical output, identical hoisted names, and
//!    identical export-name lists. Synthetic names are
//!    `hoist_<ordinal>_<name>` with ordinals strictly increasing in document
//!    order; generated aliases are `$$<prefix>_<ordinal>`.
//!
//! 2. **Export surface**: under boundary mode the rewritten module exports
//!    exactly the input's export names (post rename/destructure resolution).
//!    Colliding output names are a compile error, detected before any edit is
//!    finalized (D-ERR-EXPORT-002).
//!
//! 3. **Capture minimality**: a hoisted function captures exactly the names
//!    resolving to enclosing non-module scopes. Module-top-level bindings are
//!    never captured; they stay direct references in the hoisted body.
//!
//! 4. **Two-zone output**: hoist mode emits the rewritten head first and every
//!    hoisted declaration after it, never interleaved.
//!
//! 5. **Provenance**: every surviving original span is represented in the
//!    generated source map, character-level for relocated ranges. A non-trivial
//!    edit never produces a null map.
//!
//! 6. **Registry**: `resolve(id)` runs the injected loader at most once per id
//!    regardless of call concurrency, and never caches a rejected load.
//!
//! The transform pipeline is synchronous and owns no shared state; the caller
//! parses modules (oxc) and may drive many transforms in parallel. Only the
//! reference registry is a concurrent resource.

mod boundary;
mod capture;
mod directive;
mod exports;
mod hoist;
mod overlay;
mod registry;
mod scope;
mod validate;

pub use boundary::{
    transform_boundary_exports, BoundaryOptions, BoundaryOutput, ExportFilter, ExportMeta,
};
pub use capture::free_variables;
pub use directive::{
    has_function_directive, has_module_directive, scan_statement_list, DirectiveMatch,
    DirectiveSpec,
};
pub use exports::{collect_export_bindings, ExportBinding, ExportKind};
pub use hoist::{
    transform_hoist_directive, CaptureCodec, HoistOptions, HoistOutput, HoistedFunction,
};
pub use overlay::{Edit, EditKind, MapOptions, SourceOverlay};
pub use registry::{
    hashed_reference_id, register, LoadError, LoadFuture, Loader, MarkedReference, ModuleExports,
    ModuleHandle, ReferenceDescriptor, ReferenceRegistry, RegistryError, StaticModule,
};
pub use scope::{analyze_scope, Reference, Resolution, Scope, ScopeGraph, ScopeId, ScopeKind};
pub use validate::*;

#[cfg(test)]
mod registry_tests;
