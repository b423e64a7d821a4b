pub mod blob_detector;
pub mod format;
pub mod histogram;
pub mod image;
pub mod object_file;
pub mod region_grow;
pub mod shape_match;
pub mod stack;
pub mod tracked_object;
pub mod tracker;
