mod kernel;
mod support;
