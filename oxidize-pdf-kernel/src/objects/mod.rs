mod dictionary;
pub mod helpers;
mod primitive;
mod stream;

pub use dictionary::Dictionary;
pub use helpers::Resolve;
pub use primitive::{Object, ObjectId, ObjectType};
pub use stream::Stream;
