pub mod display;
pub mod view_models;

pub use view_models::{LineMoveDisplay, OptionDisplay, VariationDisplay, VariationMoveDisplay};
