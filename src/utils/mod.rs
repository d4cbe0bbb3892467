pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{
    DOCUMENT_FILE_NAME, compute_relative_path, document_path, is_fetchable_href, path_extension,
    split_fragment,
};
