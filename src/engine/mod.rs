// ── Luma Engine ────────────────────────────────────────────────────────────
//
// Engine layer: everything stateful or effectful. Modules here may depend
// on `atoms` freely; `atoms` never depends back on this layer.

pub mod assembler;
pub mod backend;
pub mod companion;
pub mod facts;
pub mod journey;
pub mod recovery;
pub mod signals;
pub mod store;
pub mod stream;
pub mod window;
