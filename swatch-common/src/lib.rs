//! # Swatch Common Library
//!
//! Shared code for the swatch services:
//! - Error type
//! - Bootstrap configuration loading
//! - Color model (RGB, CIE Lab) and the RGB → Lab converter
//! - Catalog item record

pub mod color;
pub mod config;
pub mod error;
pub mod product;

pub use color::{Lab, ProductColor, Rgb};
pub use error::{Error, Result};
pub use product::Product;
