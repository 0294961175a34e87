pub mod batch_loader;

pub use batch_loader::load_work_items;
