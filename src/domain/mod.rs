pub mod column;
pub mod table;
pub mod text;
pub mod value;

pub use column::{ColumnRef, OneOrMany};
pub use table::Table;
pub use value::Value;
