pub mod errors;
pub mod geo;
pub mod model;
pub mod query;
pub mod translate;

pub use errors::*;
pub use geo::*;
pub use model::*;
pub use query::*;
pub use translate::{translate, translate_query_string};
