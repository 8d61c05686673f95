//! Detection annotation
//!
//! Draws an outlined box per retained detection, colored by class, with a
//! filled label plate above the box's top-left corner. All drawing clips to
//! the image bounds.

use crate::classifier::Detection;
use crate::labels::LabelTable;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

/// Outline thickness of detection boxes, in pixels
pub const BOX_WIDTH: i64 = 4;

const GLYPH_SIZE: i64 = 8;
const PLATE_HEIGHT: i64 = GLYPH_SIZE + 2;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// CSS named colors, alphabetical
const PALETTE: &[[u8; 3]] = &[
    [240, 248, 255], [250, 235, 215], [0, 255, 255], [127, 255, 212], [240, 255, 255],
    [245, 245, 220], [255, 228, 196], [0, 0, 0], [255, 235, 205], [0, 0, 255], [138, 43, 226],
    [165, 42, 42], [222, 184, 135], [95, 158, 160], [127, 255, 0], [210, 105, 30], [255, 127, 80],
    [100, 149, 237], [255, 248, 220], [220, 20, 60], [0, 255, 255], [0, 0, 139], [0, 139, 139],
    [184, 134, 11], [169, 169, 169], [0, 100, 0], [169, 169, 169], [189, 183, 107], [139, 0, 139],
    [85, 107, 47], [255, 140, 0], [153, 50, 204], [139, 0, 0], [233, 150, 122], [143, 188, 143],
    [72, 61, 139], [47, 79, 79], [47, 79, 79], [0, 206, 209], [148, 0, 211], [255, 20, 147],
    [0, 191, 255], [105, 105, 105], [105, 105, 105], [30, 144, 255], [178, 34, 34], [255, 250, 240],
    [34, 139, 34], [255, 0, 255], [220, 220, 220], [248, 248, 255], [255, 215, 0], [218, 165, 32],
    [128, 128, 128], [0, 128, 0], [173, 255, 47], [128, 128, 128], [240, 255, 240], [255, 105, 180],
    [205, 92, 92], [75, 0, 130], [255, 255, 240], [240, 230, 140], [230, 230, 250], [255, 240, 245],
    [124, 252, 0], [255, 250, 205], [173, 216, 230], [240, 128, 128], [224, 255, 255],
    [250, 250, 210], [211, 211, 211], [144, 238, 144], [211, 211, 211], [255, 182, 193],
    [255, 160, 122], [32, 178, 170], [135, 206, 250], [119, 136, 153], [119, 136, 153],
    [176, 196, 222], [255, 255, 224], [0, 255, 0], [50, 205, 50], [250, 240, 230], [255, 0, 255],
    [128, 0, 0], [102, 205, 170], [0, 0, 205], [186, 85, 211], [147, 112, 219], [60, 179, 113],
    [123, 104, 238], [0, 250, 154], [72, 209, 204], [199, 21, 133], [25, 25, 112], [245, 255, 250],
    [255, 228, 225], [255, 228, 181], [255, 222, 173], [0, 0, 128], [253, 245, 230], [128, 128, 0],
    [107, 142, 35], [255, 165, 0], [255, 69, 0], [218, 112, 214], [238, 232, 170], [152, 251, 152],
    [175, 238, 238], [219, 112, 147], [255, 239, 213], [255, 218, 185], [205, 133, 63],
    [255, 192, 203], [221, 160, 221], [176, 224, 230], [128, 0, 128], [255, 0, 0], [188, 143, 143],
    [65, 105, 225], [139, 69, 19], [250, 128, 114], [244, 164, 96], [46, 139, 87], [255, 245, 238],
    [160, 82, 45], [192, 192, 192], [135, 206, 235], [106, 90, 205], [112, 128, 144],
    [112, 128, 144], [255, 250, 250], [0, 255, 127], [70, 130, 180], [210, 180, 140], [0, 128, 128],
    [216, 191, 216], [255, 99, 71], [64, 224, 208], [238, 130, 238], [245, 222, 179],
    [255, 255, 255], [245, 245, 245], [255, 255, 0], [154, 205, 50],
];

/// Deterministic color for a class index
pub fn class_color(class: usize) -> Rgb<u8> {
    Rgb(PALETTE[class % PALETTE.len()])
}

/// `"<name> (<percent>%)"` with the percentage rounded down
pub fn label_text(name: &str, score: f32) -> String {
    let percent = (score * 100.0).floor().max(0.0) as u32;
    format!("{} ({}%)", name, percent)
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn hline(image: &mut RgbImage, x1: i64, y: i64, x2: i64, color: Rgb<u8>) {
    for x in x1..=x2 {
        put(image, x, y, color);
    }
}

fn vline(image: &mut RgbImage, x: i64, y1: i64, y2: i64, color: Rgb<u8>) {
    for y in y1..=y2 {
        put(image, x, y, color);
    }
}

/// Outlined rectangle; the outline grows right and down from the corners
pub fn draw_rect(
    image: &mut RgbImage,
    (x1, y1, x2, y2): (i64, i64, i64, i64),
    width: i64,
    color: Rgb<u8>,
) {
    for i in 0..width {
        hline(image, x1, y1 + i, x2, color);
        hline(image, x1, y2 + i, x2, color);
        vline(image, x1 + i, y1, y2, color);
        vline(image, x2 + i, y1, y2, color);
    }
}

fn fill_rect(image: &mut RgbImage, x1: i64, y1: i64, x2: i64, y2: i64, color: Rgb<u8>) {
    for y in y1..=y2 {
        hline(image, x1, y, x2, color);
    }
}

/// Label plate and text whose bottom edge sits just above `(x, y)`
pub fn draw_label(image: &mut RgbImage, x: i64, y: i64, class: usize, text: &str) {
    let glyphs = text.chars().count() as i64;
    let top = y - PLATE_HEIGHT;
    fill_rect(image, x, top, x + glyphs * GLYPH_SIZE + 1, y - 1, class_color(class));

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let gx = x + 1 + i as i64 * GLYPH_SIZE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if bits & (1 << col) != 0 {
                    put(image, gx + col, top + 1 + row as i64, TEXT_COLOR);
                }
            }
        }
    }
}

/// Draw every detection and return the label texts in drawing order
pub fn annotate(
    image: &mut RgbImage,
    detections: &[Detection],
    labels: &LabelTable,
) -> Vec<String> {
    let (width, height) = image.dimensions();
    detections
        .iter()
        .map(|detection| {
            let corners = detection.bbox.to_pixels(width, height);
            let text = label_text(&labels.name(detection.class), detection.score);

            draw_rect(image, corners, BOX_WIDTH, class_color(detection.class));
            draw_label(image, corners.0, corners.1, detection.class, &text);
            text
        })
        .collect()
}
