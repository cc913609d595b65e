pub mod compose;
pub mod reconcile;
pub mod service;
pub mod shape;
pub mod traits;
pub mod types;

pub use compose::*;
pub use reconcile::*;
pub use service::*;
pub use shape::*;
pub use traits::*;
pub use types::*;
