pub mod health;
pub mod images;
pub mod llms;

pub use health::health_handler;
pub use images::{get_image, upload_image, UploadImageRequest};
pub use llms::list_llms;
