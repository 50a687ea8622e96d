use crate::db::Country;
use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fixed canvas dimensions.
pub const ARTIFACT_WIDTH: u32 = 800;
pub const ARTIFACT_HEIGHT: u32 = 600;

/// Well-known artifact file name inside the cache directory.
pub const ARTIFACT_FILE: &str = "summary.png";

const WHITE: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);
const BLACK: Rgb<u8> = Rgb([0x00, 0x00, 0x00]);

// Text scale factors: headers render at roughly 28px line height,
// detail lines at roughly 14px, matching the original layout.
const HEADER_SCALE: u32 = 4;
const DETAIL_SCALE: u32 = 2;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write summary artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode summary artifact: {0}")]
    Encode(#[from] image::ImageError),

    /// Post-commit store read failed while gathering summary inputs.
    /// The data commit already stands when this surfaces.
    #[error("store read after commit failed: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Render the summary bitmap and write it to `<cache_dir>/summary.png`,
/// creating the directory and overwriting any prior artifact.
///
/// Layout: total-count header, refresh timestamp, "Top 5" header, then one
/// line per top record with rank, name, and grouped GDP value.
pub fn generate_summary(
    total: i64,
    top: &[Country],
    generated_at: DateTime<Utc>,
    cache_dir: &Path,
) -> Result<PathBuf, ArtifactError> {
    std::fs::create_dir_all(cache_dir)?;
    let out_path = cache_dir.join(ARTIFACT_FILE);

    let mut canvas = RgbImage::from_pixel(ARTIFACT_WIDTH, ARTIFACT_HEIGHT, WHITE);

    draw_text(
        &mut canvas,
        20,
        20,
        HEADER_SCALE,
        &format!("Countries cached: {total}"),
    );
    draw_text(
        &mut canvas,
        20,
        70,
        DETAIL_SCALE,
        &format!("Last refresh: {}", generated_at.to_rfc3339()),
    );
    draw_text(&mut canvas, 20, 120, HEADER_SCALE, "Top 5 by Estimated GDP:");

    let mut y = 180;
    for (rank, country) in top.iter().enumerate() {
        let line = format!(
            "{}. {} - {}",
            rank + 1,
            country.name,
            format_gdp(country.estimated_gdp)
        );
        draw_text(&mut canvas, 40, y, DETAIL_SCALE, &line);
        y += 36;
    }

    canvas.save(&out_path)?;
    Ok(out_path)
}

/// GDP display format: comma-grouped thousands, at most 2 fractional digits
/// (trailing zeros dropped). Null renders as "n/a".
pub fn format_gdp(value: Option<f64>) -> String {
    let Some(value) = value else {
        return "n/a".to_string();
    };

    // Round to 2 fractional digits first so grouping sees the final integer part
    let rounded = (value * 100.0).round() / 100.0;
    let negative = rounded < 0.0;
    let abs = rounded.abs();

    let int_part = abs.trunc() as u64;
    let frac = ((abs - abs.trunc()) * 100.0).round() as u64;

    let digits = int_part.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);

    if frac > 0 {
        if frac % 10 == 0 {
            out.push_str(&format!(".{}", frac / 10));
        } else {
            out.push_str(&format!(".{frac:02}"));
        }
    }

    out
}

/// Paint a line of text at (x, y) with the embedded 5x7 font scaled up by
/// `scale`. Glyphs outside printable ASCII advance the cursor and draw
/// nothing.
pub fn draw_text(canvas: &mut RgbImage, x: u32, y: u32, scale: u32, text: &str) {
    let advance = 6 * scale; // 5 glyph columns + 1 column of spacing
    let mut cursor = x;

    for ch in text.chars() {
        if let Some(glyph) = glyph_for(ch) {
            for (col, bits) in glyph.iter().enumerate() {
                for row in 0..7u32 {
                    if bits >> row & 1 == 1 {
                        fill_cell(canvas, cursor + col as u32 * scale, y + row * scale, scale);
                    }
                }
            }
        }
        cursor += advance;
        if cursor >= canvas.width() {
            break;
        }
    }
}

fn fill_cell(canvas: &mut RgbImage, x: u32, y: u32, scale: u32) {
    for dy in 0..scale {
        for dx in 0..scale {
            let (px, py) = (x + dx, y + dy);
            if px < canvas.width() && py < canvas.height() {
                canvas.put_pixel(px, py, BLACK);
            }
        }
    }
}

fn glyph_for(ch: char) -> Option<&'static [u8; 5]> {
    let code = ch as u32;
    if !(0x20..0x7f).contains(&code) {
        return None;
    }
    Some(&FONT_5X7[(code - 0x20) as usize])
}

// Classic 5x7 ASCII font, column-major, bit 0 = top row. Covers 0x20-0x7E.
#[rustfmt::skip]
const FONT_5X7: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // space
    [0x00, 0x00, 0x5f, 0x00, 0x00], // !
    [0x00, 0x07, 0x00, 0x07, 0x00], // "
    [0x14, 0x7f, 0x14, 0x7f, 0x14], // #
    [0x24, 0x2a, 0x7f, 0x2a, 0x12], // $
    [0x23, 0x13, 0x08, 0x64, 0x62], // %
    [0x36, 0x49, 0x55, 0x22, 0x50], // &
    [0x00, 0x05, 0x03, 0x00, 0x00], // '
    [0x00, 0x1c, 0x22, 0x41, 0x00], // (
    [0x00, 0x41, 0x22, 0x1c, 0x00], // )
    [0x14, 0x08, 0x3e, 0x08, 0x14], // *
    [0x08, 0x08, 0x3e, 0x08, 0x08], // +
    [0x00, 0x50, 0x30, 0x00, 0x00], // ,
    [0x08, 0x08, 0x08, 0x08, 0x08], // -
    [0x00, 0x60, 0x60, 0x00, 0x00], // .
    [0x20, 0x10, 0x08, 0x04, 0x02], // /
    [0x3e, 0x51, 0x49, 0x45, 0x3e], // 0
    [0x00, 0x42, 0x7f, 0x40, 0x00], // 1
    [0x42, 0x61, 0x51, 0x49, 0x46], // 2
    [0x21, 0x41, 0x45, 0x4b, 0x31], // 3
    [0x18, 0x14, 0x12, 0x7f, 0x10], // 4
    [0x27, 0x45, 0x45, 0x45, 0x39], // 5
    [0x3c, 0x4a, 0x49, 0x49, 0x30], // 6
    [0x01, 0x71, 0x09, 0x05, 0x03], // 7
    [0x36, 0x49, 0x49, 0x49, 0x36], // 8
    [0x06, 0x49, 0x49, 0x29, 0x1e], // 9
    [0x00, 0x36, 0x36, 0x00, 0x00], // :
    [0x00, 0x56, 0x36, 0x00, 0x00], // ;
    [0x08, 0x14, 0x22, 0x41, 0x00], // <
    [0x14, 0x14, 0x14, 0x14, 0x14], // =
    [0x00, 0x41, 0x22, 0x14, 0x08], // >
    [0x02, 0x01, 0x51, 0x09, 0x06], // ?
    [0x32, 0x49, 0x79, 0x41, 0x3e], // @
    [0x7e, 0x11, 0x11, 0x11, 0x7e], // A
    [0x7f, 0x49, 0x49, 0x49, 0x36], // B
    [0x3e, 0x41, 0x41, 0x41, 0x22], // C
    [0x7f, 0x41, 0x41, 0x22, 0x1c], // D
    [0x7f, 0x49, 0x49, 0x49, 0x41], // E
    [0x7f, 0x09, 0x09, 0x09, 0x01], // F
    [0x3e, 0x41, 0x49, 0x49, 0x7a], // G
    [0x7f, 0x08, 0x08, 0x08, 0x7f], // H
    [0x00, 0x41, 0x7f, 0x41, 0x00], // I
    [0x20, 0x40, 0x41, 0x3f, 0x01], // J
    [0x7f, 0x08, 0x14, 0x22, 0x41], // K
    [0x7f, 0x40, 0x40, 0x40, 0x40], // L
    [0x7f, 0x02, 0x0c, 0x02, 0x7f], // M
    [0x7f, 0x04, 0x08, 0x10, 0x7f], // N
    [0x3e, 0x41, 0x41, 0x41, 0x3e], // O
    [0x7f, 0x09, 0x09, 0x09, 0x06], // P
    [0x3e, 0x41, 0x51, 0x21, 0x5e], // Q
    [0x7f, 0x09, 0x19, 0x29, 0x46], // R
    [0x46, 0x49, 0x49, 0x49, 0x31], // S
    [0x01, 0x01, 0x7f, 0x01, 0x01], // T
    [0x3f, 0x40, 0x40, 0x40, 0x3f], // U
    [0x1f, 0x20, 0x40, 0x20, 0x1f], // V
    [0x3f, 0x40, 0x38, 0x40, 0x3f], // W
    [0x63, 0x14, 0x08, 0x14, 0x63], // X
    [0x07, 0x08, 0x70, 0x08, 0x07], // Y
    [0x61, 0x51, 0x49, 0x45, 0x43], // Z
    [0x00, 0x7f, 0x41, 0x41, 0x00], // [
    [0x02, 0x04, 0x08, 0x10, 0x20], // backslash
    [0x00, 0x41, 0x41, 0x7f, 0x00], // ]
    [0x04, 0x02, 0x01, 0x02, 0x04], // ^
    [0x40, 0x40, 0x40, 0x40, 0x40], // _
    [0x00, 0x01, 0x02, 0x04, 0x00], // `
    [0x20, 0x54, 0x54, 0x54, 0x78], // a
    [0x7f, 0x48, 0x44, 0x44, 0x38], // b
    [0x38, 0x44, 0x44, 0x44, 0x20], // c
    [0x38, 0x44, 0x44, 0x48, 0x7f], // d
    [0x38, 0x54, 0x54, 0x54, 0x18], // e
    [0x08, 0x7e, 0x09, 0x01, 0x02], // f
    [0x0c, 0x52, 0x52, 0x52, 0x3e], // g
    [0x7f, 0x08, 0x04, 0x04, 0x78], // h
    [0x00, 0x44, 0x7d, 0x40, 0x00], // i
    [0x20, 0x40, 0x44, 0x3d, 0x00], // j
    [0x7f, 0x10, 0x28, 0x44, 0x00], // k
    [0x00, 0x41, 0x7f, 0x40, 0x00], // l
    [0x7c, 0x04, 0x18, 0x04, 0x78], // m
    [0x7c, 0x08, 0x04, 0x04, 0x78], // n
    [0x38, 0x44, 0x44, 0x44, 0x38], // o
    [0x7c, 0x14, 0x14, 0x14, 0x08], // p
    [0x08, 0x14, 0x14, 0x18, 0x7c], // q
    [0x7c, 0x08, 0x04, 0x04, 0x08], // r
    [0x48, 0x54, 0x54, 0x54, 0x20], // s
    [0x04, 0x3f, 0x44, 0x40, 0x20], // t
    [0x3c, 0x40, 0x40, 0x20, 0x7c], // u
    [0x1c, 0x20, 0x40, 0x20, 0x1c], // v
    [0x3c, 0x40, 0x30, 0x40, 0x3c], // w
    [0x44, 0x28, 0x10, 0x28, 0x44], // x
    [0x0c, 0x50, 0x50, 0x50, 0x3c], // y
    [0x44, 0x64, 0x54, 0x4c, 0x44], // z
    [0x00, 0x08, 0x36, 0x41, 0x00], // {
    [0x00, 0x00, 0x7f, 0x00, 0x00], // |
    [0x00, 0x41, 0x36, 0x08, 0x00], // }
    [0x08, 0x04, 0x08, 0x10, 0x08], // ~
];
