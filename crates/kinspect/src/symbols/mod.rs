mod table;
mod types;
mod value;

pub use table::{Symbol, SymbolTable};
pub use types::{Field, StructLayout, TypeInfo};
pub use value::Value;
