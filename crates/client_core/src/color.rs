//! Dominant colour sampling used to fill a photo's `mainColor` before upload.

use std::collections::HashSet;

use crate::error::ClientError;

/// Fraction of the pixel buffer sampled by default.
pub const SCAN_SIZE: f64 = 0.0005;

const SIMILARITY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    fn is_vivid(self) -> bool {
        [self.r, self.g, self.b]
            .into_iter()
            .all(|channel| channel > SIMILARITY && channel < 255 - SIMILARITY)
    }

    fn is_close_to(self, other: Rgb) -> bool {
        self.r.abs_diff(other.r) <= SIMILARITY
            && self.g.abs_diff(other.g) <= SIMILARITY
            && self.b.abs_diff(other.b) <= SIMILARITY
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoAnalysis {
    pub width: u32,
    pub height: u32,
    pub main_color: Option<String>,
}

/// Decodes an encoded image and measures it.
pub fn analyze_photo(bytes: &[u8]) -> Result<PhotoAnalysis, ClientError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(PhotoAnalysis {
        width,
        height,
        main_color: dominant_color(rgba.as_raw(), SCAN_SIZE),
    })
}

/// Most common colour in an RGBA buffer, as `#rrggbb`.
///
/// Every `floor(len * scan_size)`-th pixel is sampled. Each vivid sample
/// collects the other samples within 10 per channel of it under its hex
/// key; the key with the largest collection wins, earliest key on ties.
pub fn dominant_color(rgba: &[u8], scan_size: f64) -> Option<String> {
    let samples = sample_pixels(rgba, scan_size);
    let mut groups = GroupMap::default();

    for (i, sample) in samples.iter().copied().enumerate() {
        if !sample.is_vivid() {
            continue;
        }
        let members = groups.entry(sample.hex());
        for (j, other) in samples.iter().copied().enumerate() {
            if i != j && sample.is_close_to(other) {
                members.insert(j);
            }
        }
    }

    let (hex, count) = groups.largest()?;
    (count > 0).then(|| hex.to_string())
}

fn sample_pixels(rgba: &[u8], scan_size: f64) -> Vec<Rgb> {
    let len = rgba.len();
    let block = ((len as f64 * scan_size).floor() as usize).max(1);
    let step = block * 4;

    let mut samples = Vec::new();
    let mut index = step - 4;
    while index < len {
        if let [r, g, b, ..] = &rgba[index..] {
            samples.push(Rgb {
                r: *r,
                g: *g,
                b: *b,
            });
        }
        index += step;
    }
    samples
}

#[derive(Default)]
struct GroupMap {
    groups: Vec<(String, HashSet<usize>)>,
}

impl GroupMap {
    fn entry(&mut self, hex: String) -> &mut HashSet<usize> {
        let position = match self.groups.iter().position(|(key, _)| *key == hex) {
            Some(position) => position,
            None => {
                self.groups.push((hex, HashSet::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[position].1
    }

    fn largest(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (hex, members) in &self.groups {
            if best.map_or(true, |(_, count)| members.len() > count) {
                best = Some((hex.as_str(), members.len()));
            }
        }
        best
    }
}

#[cfg(test)]
#[path = "tests/color_tests.rs"]
mod tests;
