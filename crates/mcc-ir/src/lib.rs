//! Intermediate representations and lowering passes.
//!
//! The pipeline is strictly linear; each pass is a pure function from one IR
//! to the next:
//!
//! ```text
//! Cabs --SimplExpr--> Clight --SimplLocals--> Clight
//!      --cshm lowering--> Csharpminor --cminor lowering--> Cminor
//!      --selection--> CminorSel --rtlgen--> RTL
//! ```
//!
//! Types ([`ctypes`]) are shared by Clight and everything below it. The
//! machine-level operator vocabulary ([`ops`]) is shared by Csharpminor,
//! Cminor, CminorSel and RTL. Each IR has a printer producing its `-d<stage>`
//! dump.

pub mod clight;
pub mod cminor;
pub mod cminorsel;
pub mod csharpminor;
pub mod ctypes;
pub mod error;
pub mod ops;
pub mod rtl;
pub mod simplexpr;
pub mod simpllocals;

pub use ctypes::{Chunk, CompositeEnv, CType, IntSize, Signedness};
pub use error::{ElabError, LowerError};
