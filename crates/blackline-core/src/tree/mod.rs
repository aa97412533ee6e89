pub mod arena;
pub mod builder;
pub mod document;
pub mod name;
pub mod node;
pub mod schema;

pub use arena::{DocTree, Fragment};
pub use builder::DocBuilder;
pub use document::{Document, RelTarget, RelationshipSet};
pub use name::{Attribute, QName};
pub use node::NodeData;
