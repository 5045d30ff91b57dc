//! Candidate request formats.
//!
//! The upstream contract is not reliably documented: depending on deployment
//! it has accepted an `image_urls` array, a single inline `image` field, or an
//! `images` array. Rather than hard-coding one schema, each shape is a small
//! descriptor and the negotiator walks the list in order.

use serde_json::{json, Value};

use crate::photo::PhotoRepresentations;
use crate::styles::Hairstyle;

/// Which photo representation a candidate consumes and under what field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageField {
    /// `"image_urls": [<public url>]`
    ImageUrls,
    /// `"image": "<base64>"`
    InlineImage,
    /// `"images": ["<base64>"]`
    InlineImageArray,
}

/// One payload shape the orchestrator is willing to try.
#[derive(Debug, Clone, Copy)]
pub struct CandidateFormat {
    pub name: &'static str,
    pub field: ImageField,
}

/// Probe order. The URL shape goes first because it is the one the service
/// documented; the inline shapes cover deployments that reject URLs.
pub const CANDIDATE_FORMATS: &[CandidateFormat] = &[
    CandidateFormat {
        name: "image-urls",
        field: ImageField::ImageUrls,
    },
    CandidateFormat {
        name: "inline-image",
        field: ImageField::InlineImage,
    },
    CandidateFormat {
        name: "inline-image-array",
        field: ImageField::InlineImageArray,
    },
];

/// Prompt text sent with every candidate.
pub fn prompt_for(style: Hairstyle) -> String {
    format!(
        "A photorealistic portrait of a person with beautiful {}, high detail, 8k",
        style.prompt()
    )
}

impl CandidateFormat {
    /// Build the request body, or `None` when the representation this shape
    /// needs is unavailable (no public URL) and the candidate must be skipped.
    pub fn payload(&self, photo: &PhotoRepresentations, style: Hairstyle) -> Option<Value> {
        let prompt = prompt_for(style);
        let body = match self.field {
            ImageField::ImageUrls => {
                let url = photo.url.as_ref()?;
                json!({ "prompt": prompt, "image_urls": [url] })
            }
            ImageField::InlineImage => {
                json!({ "prompt": prompt, "image": photo.inline })
            }
            ImageField::InlineImageArray => {
                json!({ "prompt": prompt, "images": [photo.inline] })
            }
        };
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repr(url: Option<&str>) -> PhotoRepresentations {
        PhotoRepresentations {
            inline: "aGVsbG8=".to_string(),
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn url_format_uses_url_array() {
        let body = CANDIDATE_FORMATS[0]
            .payload(&repr(Some("https://files.example/p.jpg")), Hairstyle::BobCut)
            .unwrap();

        assert_eq!(body["image_urls"][0], "https://files.example/p.jpg");
        assert!(body["prompt"].as_str().unwrap().contains("bob cut"));
    }

    #[test]
    fn url_format_skipped_without_url() {
        assert!(CANDIDATE_FORMATS[0]
            .payload(&repr(None), Hairstyle::BobCut)
            .is_none());
    }

    #[test]
    fn inline_formats_always_available() {
        let body = CANDIDATE_FORMATS[1]
            .payload(&repr(None), Hairstyle::LongCurly)
            .unwrap();
        assert_eq!(body["image"], "aGVsbG8=");

        let body = CANDIDATE_FORMATS[2]
            .payload(&repr(None), Hairstyle::LongCurly)
            .unwrap();
        assert_eq!(body["images"][0], "aGVsbG8=");
    }

    #[test]
    fn prompt_embeds_style_fragment() {
        let prompt = prompt_for(Hairstyle::RainbowColored);
        assert!(prompt.contains("rainbow colored hair"));
        assert!(prompt.starts_with("A photorealistic portrait"));
    }
}
