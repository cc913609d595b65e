pub mod frame_extractor;
pub mod field_image;
pub mod loader;
pub mod scene;
pub mod transformer;

pub use frame_extractor::*;
pub use field_image::*;
pub use loader::*;
pub use scene::*;
pub use transformer::*;
