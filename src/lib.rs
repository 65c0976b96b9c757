#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod annotator;
pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;
