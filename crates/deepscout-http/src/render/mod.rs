//! Report text to PDF.

pub mod blocks;
pub mod inline;
pub mod pdf;

pub use pdf::{format_date, render_pdf};
