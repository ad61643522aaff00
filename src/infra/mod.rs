pub(crate) mod app_paths;
pub(crate) mod settings;
pub(crate) mod storage;
