pub mod category;
pub mod resource;
pub mod taxonomy;
pub mod technology;

pub use category::Category;
pub use resource::{Resource, ResourceCategory, ResourceInput};
pub use taxonomy::Taxonomy;
pub use technology::Technology;
