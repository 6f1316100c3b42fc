mod contact;
mod content;
mod id;
mod routing_table;

pub use contact::*;
pub use content::*;
pub use id::*;
pub use routing_table::*;
