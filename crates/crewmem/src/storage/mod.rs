pub mod filter;
pub mod lance;
pub mod row;
pub mod tables;

pub use filter::RowFilter;
pub use lance::LanceStore;
pub use row::Row;
