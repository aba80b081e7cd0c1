//! Public types for the Huginn API.

mod generation;
mod image;

pub use generation::{Description, Enrichment, GenerationMode, Improvement, Usage};
pub use image::{
    ImageId, ImageRef, ImageSource, ResolvedImage, data_uri, mime_from_extension, sniff_mime,
};
