pub mod loader;
pub mod selector;
pub mod store;

pub use loader::{
    GridLoadError, GridTable, load_grid_store, parse_abundance_file_name, parse_imf_file_name,
    read_grid_table,
};
pub use selector::{GridAxes, GridSelection, GridSelector};
pub use store::{GridKey, GridPoint, GridStore};
