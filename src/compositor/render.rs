//! Composite rendering
//!
//! Decodes each client's latest frame, tiles the results onto a black canvas
//! and encodes the canvas as JPEG. Rendering is a pure function of the
//! snapshot: the compositor holds no mutable state and can run on any number
//! of worker threads at once.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImage, RgbImage};

use super::layout::GridLayout;
use crate::error::{Error, Result};
use crate::registry::ClientFrame;

/// Default cell width in pixels
pub const DEFAULT_CELL_WIDTH: u32 = 320;

/// Default cell height in pixels
pub const DEFAULT_CELL_HEIGHT: u32 = 240;

/// Largest accepted cell width or height in pixels
pub const MAX_CELL_DIMENSION: u32 = 4096;

/// Default JPEG quality for the composite
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Why a cell was left blank
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlankReason {
    /// The client has no frames yet
    NoFrame,
    /// The frame bytes could not be decoded
    DecodeFailed(String),
}

/// A rendered but not yet encoded composite
#[derive(Debug)]
pub struct CompositeImage {
    /// Canvas pixels
    pub image: RgbImage,
    /// Grid used for this canvas
    pub layout: GridLayout,
    /// Cells left blank, by cell index
    pub blank_cells: Vec<(usize, BlankReason)>,
}

/// Grid compositor
#[derive(Debug, Clone)]
pub struct Compositor {
    cell_width: u32,
    cell_height: u32,
    jpeg_quality: u8,
}

impl Compositor {
    /// Create a compositor with the given cell size
    ///
    /// Each side is clamped to `1..=MAX_CELL_DIMENSION`.
    pub fn new(cell_width: u32, cell_height: u32) -> Self {
        Self {
            cell_width: cell_width.clamp(1, MAX_CELL_DIMENSION),
            cell_height: cell_height.clamp(1, MAX_CELL_DIMENSION),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the JPEG quality (1-100)
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Cell size as `(width, height)`
    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    /// Tile every client's latest frame onto one canvas
    ///
    /// A frame that fails to decode leaves its cell black; it never changes
    /// the layout or the other cells. Fails only when the grid is too large
    /// to address.
    pub fn compose(&self, snapshot: &[ClientFrame]) -> Result<CompositeImage> {
        let layout = GridLayout::for_clients(snapshot.len());
        let (width, height) = layout
            .canvas_size(self.cell_width, self.cell_height)
            .ok_or(Error::CanvasTooLarge {
                rows: layout.rows,
                cols: layout.cols,
            })?;
        let mut canvas = RgbImage::new(width, height);
        let mut blank_cells = Vec::new();

        for (index, client) in snapshot.iter().enumerate() {
            let Some(ref data) = client.frame else {
                blank_cells.push((index, BlankReason::NoFrame));
                continue;
            };

            let tile = match self.decode_tile(data) {
                Ok(tile) => tile,
                Err(e) => {
                    tracing::debug!(client = %client.id, error = %e, "Frame decode failed, cell left blank");
                    blank_cells.push((index, BlankReason::DecodeFailed(e.to_string())));
                    continue;
                }
            };

            let (x, y) = layout.cell_offset(index, self.cell_width, self.cell_height);
            if let Err(e) = canvas.copy_from(&tile, x, y) {
                tracing::debug!(client = %client.id, error = %e, "Tile placement failed");
                blank_cells.push((index, BlankReason::DecodeFailed(e.to_string())));
            }
        }

        Ok(CompositeImage {
            image: canvas,
            layout,
            blank_cells,
        })
    }

    /// Compose and encode a snapshot as JPEG
    pub fn render(&self, snapshot: &[ClientFrame]) -> Result<Bytes> {
        let composite = self.compose(snapshot)?;
        self.encode(&composite.image)
    }

    /// Encoded single blank cell, shown when nothing else is available
    pub fn blank_frame(&self) -> Result<Bytes> {
        self.encode(&RgbImage::new(self.cell_width, self.cell_height))
    }

    /// Encode a canvas as JPEG
    pub fn encode(&self, image: &RgbImage) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(image.as_raw().len() / 8);
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality);
            encoder.encode_image(image)?;
        }
        Ok(Bytes::from(buf))
    }

    /// Decode a frame and fit it to the cell size
    fn decode_tile(&self, data: &[u8]) -> Result<RgbImage> {
        let decoded = image::load_from_memory(data)?.to_rgb8();
        if decoded.dimensions() == (self.cell_width, self.cell_height) {
            Ok(decoded)
        } else {
            Ok(image::imageops::resize(
                &decoded,
                self.cell_width,
                self.cell_height,
                FilterType::Triangle,
            ))
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_WIDTH, DEFAULT_CELL_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::registry::ClientId;

    const W: u32 = 32;
    const H: u32 = 24;

    fn solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Bytes {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        Compositor::new(width, height).jpeg_quality(95).encode(&img).unwrap()
    }

    fn client(id: &str, frame: Option<Bytes>) -> ClientFrame {
        ClientFrame::new(ClientId::new(id), frame)
    }

    fn assert_close(pixel: &Rgb<u8>, expected: [u8; 3]) {
        for (got, want) in pixel.0.iter().zip(expected) {
            assert!(
                (*got as i16 - want as i16).abs() < 40,
                "pixel {:?} not close to {:?}",
                pixel.0,
                expected
            );
        }
    }

    #[test]
    fn test_empty_snapshot_is_single_blank_cell() {
        let compositor = Compositor::new(W, H);
        let composite = compositor.compose(&[]).unwrap();

        assert_eq!(composite.image.dimensions(), (W, H));
        assert!(composite.image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_canvas_dimensions_follow_client_count() {
        let compositor = Compositor::new(W, H);
        let red = solid_jpeg(W, H, [255, 0, 0]);

        for (n, (cols, rows)) in [(1, (1, 1)), (2, (2, 1)), (3, (2, 2)), (5, (3, 2))] {
            let snapshot: Vec<ClientFrame> = (0..n)
                .map(|i| client(&format!("c{i}"), Some(red.clone())))
                .collect();
            let composite = compositor.compose(&snapshot).unwrap();
            assert_eq!(composite.image.dimensions(), (cols * W, rows * H), "n={n}");
        }
    }

    #[test]
    fn test_tiles_placed_in_snapshot_order() {
        let compositor = Compositor::new(W, H);
        let snapshot = vec![
            client("red", Some(solid_jpeg(W, H, [255, 0, 0]))),
            client("green", Some(solid_jpeg(W, H, [0, 255, 0]))),
            client("blue", Some(solid_jpeg(W, H, [0, 0, 255]))),
        ];

        let composite = compositor.compose(&snapshot).unwrap();
        let img = &composite.image;

        assert_close(img.get_pixel(W / 2, H / 2), [255, 0, 0]);
        assert_close(img.get_pixel(W + W / 2, H / 2), [0, 255, 0]);
        assert_close(img.get_pixel(W / 2, H + H / 2), [0, 0, 255]);
        // Fourth cell unused
        assert_eq!(img.get_pixel(W + W / 2, H + H / 2).0, [0, 0, 0]);
    }

    #[test]
    fn test_decode_failure_leaves_only_that_cell_blank() {
        let compositor = Compositor::new(W, H);
        let snapshot = vec![
            client("good", Some(solid_jpeg(W, H, [255, 255, 255]))),
            client("bad", Some(Bytes::from_static(b"definitely not a jpeg"))),
        ];

        let composite = compositor.compose(&snapshot).unwrap();

        assert_eq!(composite.image.dimensions(), (2 * W, H));
        assert_close(composite.image.get_pixel(W / 2, H / 2), [255, 255, 255]);
        assert_eq!(composite.image.get_pixel(W + W / 2, H / 2).0, [0, 0, 0]);
        assert_eq!(composite.blank_cells.len(), 1);
        assert!(matches!(
            composite.blank_cells[0],
            (1, BlankReason::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_missing_frame_is_blank() {
        let compositor = Compositor::new(W, H);
        let composite = compositor.compose(&[client("idle", None)]).unwrap();

        assert_eq!(composite.blank_cells, vec![(0, BlankReason::NoFrame)]);
    }

    #[test]
    fn test_mismatched_frame_is_resized() {
        let compositor = Compositor::new(W, H);
        let big = solid_jpeg(W * 3, H * 2, [0, 0, 255]);

        let composite = compositor.compose(&[client("big", Some(big))]).unwrap();

        assert_eq!(composite.image.dimensions(), (W, H));
        assert!(composite.blank_cells.is_empty());
        assert_close(composite.image.get_pixel(W / 2, H / 2), [0, 0, 255]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let compositor = Compositor::new(W, H);
        let snapshot = vec![
            client("a", Some(solid_jpeg(W, H, [200, 10, 10]))),
            client("b", Some(Bytes::from_static(b"junk"))),
            client("c", Some(solid_jpeg(W, H, [10, 10, 200]))),
        ];

        let first = compositor.render(&snapshot).unwrap();
        let second = compositor.render(&snapshot).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_output_decodes() {
        let compositor = Compositor::new(W, H);
        let snapshot = vec![client("a", Some(solid_jpeg(W, H, [0, 255, 0])))];

        let jpeg = compositor.render(&snapshot).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (W, H));
    }

    #[test]
    fn test_blank_frame() {
        let compositor = Compositor::new(W, H);
        let jpeg = compositor.blank_frame().unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (W, H));
    }

    #[test]
    fn test_quality_clamped() {
        let compositor = Compositor::default().jpeg_quality(0);
        assert_eq!(compositor.jpeg_quality, 1);
        assert_eq!(compositor.cell_size(), (320, 240));
    }

    #[test]
    fn test_cell_size_capped() {
        let compositor = Compositor::new(2_000_000_000, 0);
        assert_eq!(compositor.cell_size(), (MAX_CELL_DIMENSION, 1));
    }
}
