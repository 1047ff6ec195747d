//! Interactive, discoverable command shell for Klipper printers driven
//! through the Moonraker API.

pub mod api;
pub mod completion;
pub mod console;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod model;
pub mod parser;
pub mod paths;
pub mod registry;
pub mod render;
pub mod settings;
pub mod shell;
pub mod state;
pub mod util;
