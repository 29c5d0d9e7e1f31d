pub mod data;
pub mod endpoints;
pub mod helpers;
pub mod ids;
pub mod normalize;
pub mod store;
pub mod sync;

pub use endpoints::SharedStore;
