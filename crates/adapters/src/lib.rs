//! Package-Manager Adapters: pip and uv implementations of a single
//! capability-set trait, sharing manifest-parsing primitives (version
//! specs, PEP 503 normalization) across both.

pub mod base;
pub mod error;
pub mod normalize;
pub mod pip;
pub mod uv;
pub mod version_spec;

pub use base::{AdapterContext, DetectionResult, InstallOptions, PackageManagerAdapter};
pub use error::{ErrorKind, PackageManagerError};
pub use normalize::normalize_pep503;
pub use pip::PipAdapter;
pub use uv::UvAdapter;
pub use version_spec::{parse_version_spec, render_version_spec, split_extras};
