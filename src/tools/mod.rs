/// Tools Module
///
/// Each tool module exports a `register` function that adds its tools to the
/// registry during server initialization.

pub mod date;
