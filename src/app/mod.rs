pub(crate) mod flow;
pub(crate) mod logging;
pub(crate) mod render;
