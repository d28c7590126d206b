use uuid::Uuid;

pub const MESSAGE_PREFIX: &str = "msg";
pub const IMAGE_PREFIX: &str = "img";

pub fn create_object_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Id of a generated assistant message.
pub fn message_id() -> String {
    create_object_id(MESSAGE_PREFIX)
}

/// Unique file name for an image written to disk.
pub fn image_file_name(extension: &str) -> String {
    format!("{}.{}", create_object_id(IMAGE_PREFIX), extension)
}
