//! Comic Composition
//!
//! Lays the rendered panels out on a fixed grid under a title band. Composition is pure:
//! the same outcomes, date and fonts always produce the same pixels. Failed panels keep
//! their grid slot as a blank placeholder.

use crate::config::{FontConfig, WebConfig};
use crate::error::ComposeError;
use crate::types::{display_date, PanelIndex, PanelOutcome};
use ab_glyph::{FontArc, PxScale};
use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Grid geometry and palette
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub panel_width: u32,
    pub panel_height: u32,
    pub columns: u32,
    pub rows: u32,
    pub gutter: u32,
    pub border: u32,
    pub header_height: u32,
    pub margin: u32,
    pub background: Rgb<u8>,
    pub ink: Rgb<u8>,
    pub placeholder: Rgb<u8>,
    pub title_size: f32,
    pub date_size: f32,
    /// Date baseline offset below the title's top edge
    pub date_offset: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            panel_width: 400,
            panel_height: 600,
            columns: 3,
            rows: 2,
            gutter: 12,
            border: 3,
            header_height: 100,
            margin: 30,
            background: Rgb([252, 249, 242]),
            ink: Rgb([40, 35, 30]),
            placeholder: Rgb([236, 230, 218]),
            title_size: 48.0,
            date_size: 22.0,
            date_offset: 55,
        }
    }
}

impl Layout {
    pub fn canvas_width(&self) -> u32 {
        self.margin * 2 + self.columns * self.panel_width + (self.columns - 1) * self.gutter
    }

    pub fn canvas_height(&self) -> u32 {
        self.margin * 2
            + self.header_height
            + self.rows * self.panel_height
            + (self.rows - 1) * self.gutter
    }

    /// Top-left pixel of a panel's cell
    pub fn cell_origin(&self, panel: PanelIndex) -> (u32, u32) {
        let slot = panel.slot() as u32;
        let col = slot % self.columns;
        let row = slot / self.columns;
        (
            self.margin + col * (self.panel_width + self.gutter),
            self.margin + self.header_height + row * (self.panel_height + self.gutter),
        )
    }
}

/// Fonts for the title band
#[derive(Clone)]
pub struct FontSet {
    pub title: FontArc,
    pub date: FontArc,
}

static BUNDLED_TITLE: &[u8] = include_bytes!("../assets/fonts/DejaVuSansCondensed-Bold.ttf");
static BUNDLED_DATE: &[u8] = include_bytes!("../assets/fonts/DejaVuSansCondensed.ttf");

impl FontSet {
    pub fn load(title_path: &Path, date_path: &Path) -> Result<Self, ComposeError> {
        Ok(Self {
            title: load_font(title_path)?,
            date: load_font(date_path)?,
        })
    }

    /// DejaVu Sans Condensed, compiled into the binary
    pub fn bundled() -> Result<Self, ComposeError> {
        let parse = |name: &str, bytes: &'static [u8]| {
            FontArc::try_from_slice(bytes).map_err(|e| ComposeError::Font {
                path: PathBuf::from(name),
                message: e.to_string(),
            })
        };
        Ok(Self {
            title: parse("DejaVuSansCondensed-Bold.ttf", BUNDLED_TITLE)?,
            date: parse("DejaVuSansCondensed.ttf", BUNDLED_DATE)?,
        })
    }

    /// Configured fonts, falling back to the bundled set when unset or unreadable.
    /// A lone title font is used for the date as well.
    pub fn from_config(config: &FontConfig) -> Option<Self> {
        if let Some(title_path) = config.title.as_deref() {
            let date_path = config.date.as_deref().unwrap_or(title_path);
            match Self::load(title_path, date_path) {
                Ok(fonts) => return Some(fonts),
                Err(e) => warn!(error = %e, "Configured font unavailable, using bundled font"),
            }
        }
        match Self::bundled() {
            Ok(fonts) => Some(fonts),
            Err(e) => {
                warn!(error = %e, "Bundled font unusable, title band will be blank");
                None
            }
        }
    }
}

fn load_font(path: &Path) -> Result<FontArc, ComposeError> {
    let bytes = std::fs::read(path).map_err(|e| ComposeError::Font {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    FontArc::try_from_vec(bytes).map_err(|e| ComposeError::Font {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Compose the strip: title band, then every cell bordered, successful panels resized
/// into their cell and failed panels left as placeholders.
pub fn compose(
    outcomes: &[PanelOutcome],
    date: NaiveDate,
    title: &str,
    layout: &Layout,
    fonts: Option<&FontSet>,
) -> Result<RgbImage, ComposeError> {
    let mut canvas = RgbImage::from_pixel(
        layout.canvas_width(),
        layout.canvas_height(),
        layout.background,
    );

    if let Some(fonts) = fonts {
        let x = layout.margin as i32;
        let y = layout.margin as i32;
        draw_text_mut(
            &mut canvas,
            layout.ink,
            x,
            y,
            PxScale::from(layout.title_size),
            &fonts.title,
            title,
        );
        draw_text_mut(
            &mut canvas,
            layout.ink,
            x,
            y + layout.date_offset as i32,
            PxScale::from(layout.date_size),
            &fonts.date,
            &display_date(date),
        );
    }

    for panel in PanelIndex::all() {
        let (x, y) = layout.cell_origin(panel);
        draw_border(&mut canvas, layout, x, y);

        let image = outcomes
            .iter()
            .find(|o| o.panel_index == panel && o.is_success())
            .and_then(|o| o.image_bytes.as_deref());

        match image {
            Some(bytes) => {
                let decoded = image::load_from_memory(bytes)
                    .map_err(|e| ComposeError::PanelDecode {
                        panel,
                        message: e.to_string(),
                    })?
                    .to_rgb8();
                let resized = imageops::resize(
                    &decoded,
                    layout.panel_width,
                    layout.panel_height,
                    FilterType::Lanczos3,
                );
                imageops::replace(&mut canvas, &resized, i64::from(x), i64::from(y));
            }
            None => {
                debug!(panel = %panel, "Placeholder for failed panel");
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(x as i32, y as i32).of_size(layout.panel_width, layout.panel_height),
                    layout.placeholder,
                );
            }
        }
    }

    Ok(canvas)
}

fn draw_border(canvas: &mut RgbImage, layout: &Layout, x: u32, y: u32) {
    for inset in 0..layout.border {
        let offset = (layout.border - inset) as i32;
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x as i32 - offset, y as i32 - offset)
                .of_size(layout.panel_width + 2 * offset as u32, layout.panel_height + 2 * offset as u32),
            layout.ink,
        );
    }
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ComposeError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ComposeError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Web copy of the strip: scaled down to `max_width` when wider, JPEG at `quality`.
pub fn encode_web_jpeg(image: &RgbImage, web: &WebConfig) -> Result<Vec<u8>, ComposeError> {
    let scaled;
    let source = if image.width() > web.max_width {
        let height = (u64::from(image.height()) * u64::from(web.max_width)
            / u64::from(image.width())) as u32;
        scaled = imageops::resize(image, web.max_width, height.max(1), FilterType::Lanczos3);
        &scaled
    } else {
        image
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, web.quality)
        .encode_image(source)
        .map_err(|e| ComposeError::Encode(e.to_string()))?;
    Ok(bytes)
}
