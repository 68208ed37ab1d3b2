pub mod expire_config;
pub mod record;
pub mod report;
pub mod result_error;
pub mod retention;
pub mod scanner;
pub mod sweep;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
