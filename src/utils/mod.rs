pub mod path;

pub use path::{full_path, full_path_key, normalize_separators, split_relative};
