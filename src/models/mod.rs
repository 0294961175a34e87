pub mod image_ref;
pub mod loaders;
pub mod result_record;
pub mod work_item;

pub use image_ref::{encode_image_data_uri, is_remote_or_inline, resolve_image_ref};
pub use loaders::load_work_items;
pub use result_record::ResultRecord;
pub use work_item::{BatchRequest, WorkItem};
