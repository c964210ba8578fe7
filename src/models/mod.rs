pub mod comment;
pub mod pagination;
pub mod post;
pub mod user;
pub mod vote;

pub use comment::*;
pub use pagination::*;
pub use post::*;
pub use user::*;
pub use vote::*;
